//! Attribute provider seam.
//!
//! A provider turns an image reference into a [`FaceAttributesResponse`] or
//! a classified [`ProviderError`]. The rule engine is never run on an error.

use crate::types::FaceAttributesResponse;
use crate::vendor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Vendor cap on faces that carry attribute data.
pub const MAX_ATTRIBUTE_FACES: u32 = 5;

/// Image handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Url(String),
    Bytes(Vec<u8>),
}

impl ImageRef {
    /// Short description for logs; never dumps raw bytes.
    pub fn describe(&self) -> String {
        match self {
            ImageRef::Url(url) => url.clone(),
            ImageRef::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// Attribute groups the avatar rules need from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeCategory {
    /// Eye openness and glasses.
    Eye,
    Headpose,
    Mask,
    /// Mouth completeness.
    Mouth,
    /// Nose completeness.
    Nose,
}

impl AttributeCategory {
    pub fn vendor_name(&self) -> &'static str {
        match self {
            AttributeCategory::Eye => "Eye",
            AttributeCategory::Headpose => "Headpose",
            AttributeCategory::Mask => "Mask",
            AttributeCategory::Mouth => "Mouth",
            AttributeCategory::Nose => "Nose",
        }
    }

    /// Categories the avatar rules read.
    pub fn avatar_set() -> BTreeSet<AttributeCategory> {
        BTreeSet::from([
            AttributeCategory::Headpose,
            AttributeCategory::Mask,
            AttributeCategory::Eye,
            AttributeCategory::Mouth,
            AttributeCategory::Nose,
        ])
    }

    /// Comma-joined vendor request value, e.g. `"Eye,Headpose,Mask"`.
    pub fn request_list(categories: &BTreeSet<AttributeCategory>) -> String {
        categories
            .iter()
            .map(|c| c.vendor_name())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Terminal,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("provider timed out: {0}")]
    Timeout(String),
    #[error("transient provider failure: {0}")]
    ServerError(String),
    #[error("no face in image")]
    NoFace,
    #[error("unusable image: {0}")]
    BadImage(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("malformed provider payload: {0}")]
    Decode(String),
    #[error("no response available for {0}")]
    Unavailable(String),
    #[error("vendor error {code}: {message}")]
    Vendor { code: String, message: String },
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimited(_)
            | ProviderError::Timeout(_)
            | ProviderError::ServerError(_) => ErrorClass::Retryable,
            ProviderError::NoFace
            | ProviderError::BadImage(_)
            | ProviderError::Auth(_)
            | ProviderError::QuotaExhausted(_)
            | ProviderError::Decode(_)
            | ProviderError::Unavailable(_)
            | ProviderError::Vendor { .. } => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

/// Source of face-attribute payloads.
pub trait AttributeProvider: Send + Sync {
    fn detect(
        &self,
        image: &ImageRef,
        requested: &BTreeSet<AttributeCategory>,
        max_faces: u32,
    ) -> Result<FaceAttributesResponse, ProviderError>;
}

/// Provider backed by previously captured vendor responses, keyed by URL.
///
/// Lets threshold changes be replayed offline against real payloads.
#[derive(Debug, Default)]
pub struct RecordedProvider {
    responses: HashMap<String, String>,
}

impl RecordedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<String>) {
        self.responses.insert(key.into(), body.into());
    }

    pub fn with_response(mut self, key: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(key, body);
        self
    }
}

impl AttributeProvider for RecordedProvider {
    fn detect(
        &self,
        image: &ImageRef,
        requested: &BTreeSet<AttributeCategory>,
        max_faces: u32,
    ) -> Result<FaceAttributesResponse, ProviderError> {
        let ImageRef::Url(key) = image else {
            return Err(ProviderError::Unavailable(image.describe()));
        };
        let body = self
            .responses
            .get(key)
            .ok_or_else(|| ProviderError::Unavailable(key.clone()))?;

        tracing::debug!(
            image = %key,
            attributes = %AttributeCategory::request_list(requested),
            max_faces,
            "replaying recorded response"
        );

        vendor::decode_response_limited(body, max_faces as usize)
    }
}
