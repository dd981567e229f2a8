//! Decoding of the vendor `DetectFaceAttributes` payload.
//!
//! Raw integer codes are mapped to named variants here and nowhere else.
//! For a sole detected face an unmapped code or a missing attribute block is
//! a decode error, never a silently defaulted value. When several faces come
//! back, faces without usable attributes are only counted.

use crate::provider::ProviderError;
use crate::types::{
    Completeness, EyeState, FaceAttributes, FaceAttributesResponse, FaceBox, GlassesState,
    HeadPose, ImageMetadata, MaskState, Occlusion,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawResponse {
    #[serde(default)]
    face_detail_infos: Option<Vec<RawFace>>,
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
    face_model_version: Option<String>,
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFace {
    face_rect: Option<RawRect>,
    face_detail_attributes_info: Option<RawAttributes>,
    face_quality_info: Option<RawQuality>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttributes {
    head_pose: Option<RawHeadPose>,
    mask: Option<RawCoded>,
    eye: Option<RawEye>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawHeadPose {
    pitch: f64,
    yaw: f64,
    roll: f64,
}

/// `{"Type": n, "Probability": p}` as used by most vendor attributes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCoded {
    #[serde(rename = "Type")]
    code: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEye {
    glass: Option<RawCoded>,
    eye_open: Option<RawCoded>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawQuality {
    completeness: Option<RawCompleteness>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCompleteness {
    eye: i64,
    mouth: i64,
    nose: i64,
}

pub fn mask_from_code(code: i64) -> Option<MaskState> {
    match code {
        0 => Some(MaskState::None),
        1 => Some(MaskState::WornExposed),
        2 => Some(MaskState::WornCoveringChin),
        3 => Some(MaskState::WornCoveringMouth),
        4 => Some(MaskState::WornCorrectly),
        _ => None,
    }
}

pub fn glasses_from_code(code: i64) -> Option<GlassesState> {
    match code {
        0 => Some(GlassesState::None),
        1 => Some(GlassesState::Plain),
        2 => Some(GlassesState::Sunglasses),
        _ => None,
    }
}

pub fn eye_state_from_code(code: i64) -> Option<EyeState> {
    match code {
        0 => Some(EyeState::Open),
        1 => Some(EyeState::Closed),
        _ => None,
    }
}

/// Map a vendor error code onto the provider error taxonomy.
pub fn classify_error(code: &str, message: &str) -> ProviderError {
    let msg = || format!("{code}: {message}");
    match code {
        "InvalidParameterValue.NoFaceInPhoto" => ProviderError::NoFace,
        "FailedOperation.RequestTimeout" => ProviderError::Timeout(msg()),
        "FailedOperation.ServerError" | "FailedOperation.InnerError" => {
            ProviderError::ServerError(msg())
        }
        "FailedOperation.ImageDecodeFailed"
        | "FailedOperation.ImageDownloadError"
        | "FailedOperation.ImageSizeExceed"
        | "FailedOperation.ImageResolutionExceed"
        | "FailedOperation.ImageResolutionTooSmall"
        | "InvalidParameterValue.ImageEmpty" => ProviderError::BadImage(msg()),
        c if c.starts_with("RequestLimitExceeded") => ProviderError::RateLimited(msg()),
        c if c.starts_with("InternalError") => ProviderError::ServerError(msg()),
        c if c.starts_with("AuthFailure") => ProviderError::Auth(msg()),
        c if c.starts_with("ResourceUnavailable") || c.starts_with("ResourceInsufficient") => {
            ProviderError::QuotaExhausted(msg())
        }
        _ => ProviderError::Vendor {
            code: code.to_string(),
            message: message.to_string(),
        },
    }
}

/// Decode a vendor response body.
pub fn decode_response(body: &str) -> Result<FaceAttributesResponse, ProviderError> {
    decode_response_limited(body, usize::MAX)
}

/// Decode a vendor response body, keeping at most `max_faces` faces.
///
/// Faces past the cap are dropped before decoding, so they can never turn
/// the payload into a decode error.
pub fn decode_response_limited(
    body: &str,
    max_faces: usize,
) -> Result<FaceAttributesResponse, ProviderError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(format!("invalid JSON: {e}")))?;
    decode_value_limited(&value, max_faces)
}

/// Decode an already-parsed response, bare or wrapped in `{"Response": ...}`.
pub fn decode_value(value: &Value) -> Result<FaceAttributesResponse, ProviderError> {
    decode_value_limited(value, usize::MAX)
}

fn decode_value_limited(
    value: &Value,
    max_faces: usize,
) -> Result<FaceAttributesResponse, ProviderError> {
    let inner = value.get("Response").unwrap_or(value);

    if let Some(err) = inner.get("Error") {
        let err: RawError = serde_json::from_value(err.clone())
            .map_err(|e| ProviderError::Decode(format!("error object: {e}")))?;
        return Err(classify_error(&err.code, &err.message));
    }

    let raw: RawResponse = serde_json::from_value(inner.clone())
        .map_err(|e| ProviderError::Decode(e.to_string()))?;

    let mut raw_faces = raw.face_detail_infos.unwrap_or_default();
    raw_faces.truncate(max_faces);

    // Only a sole face is ever inspected by the rules.
    let strict = raw_faces.len() == 1;
    let mut faces = Vec::with_capacity(raw_faces.len());
    let mut unattributed_faces = 0;
    for (i, face) in raw_faces.into_iter().enumerate() {
        match decode_face(face) {
            Ok(face) => faces.push(face),
            Err(e) if strict => return Err(ProviderError::Decode(format!("face {i}: {e}"))),
            Err(e) => {
                tracing::debug!(face = i, reason = %e, "face without usable attributes");
                unattributed_faces += 1;
            }
        }
    }

    Ok(FaceAttributesResponse {
        faces,
        unattributed_faces,
        image: ImageMetadata {
            width: raw.image_width,
            height: raw.image_height,
            model_version: raw.face_model_version,
            request_id: raw.request_id,
        },
    })
}

fn decode_face(face: RawFace) -> Result<FaceAttributes, String> {
    let rect = face.face_rect.ok_or("missing FaceRect")?;
    let attrs = face
        .face_detail_attributes_info
        .ok_or("missing FaceDetailAttributesInfo")?;
    let pose = attrs.head_pose.ok_or("missing HeadPose")?;
    let mask = attrs.mask.ok_or("missing Mask")?;
    let eye = attrs.eye.ok_or("missing Eye")?;
    let glass = eye.glass.ok_or("missing Eye.Glass")?;
    let eye_open = eye.eye_open.ok_or("missing Eye.EyeOpen")?;

    let occlusion = Occlusion {
        mask: mask_from_code(mask.code).ok_or_else(|| format!("unknown mask code {}", mask.code))?,
        glasses: glasses_from_code(glass.code)
            .ok_or_else(|| format!("unknown glass code {}", glass.code))?,
        eye_state: eye_state_from_code(eye_open.code)
            .ok_or_else(|| format!("unknown eye-open code {}", eye_open.code))?,
    };

    let completeness = face
        .face_quality_info
        .and_then(|q| q.completeness)
        .map(decode_completeness)
        .transpose()?;

    Ok(FaceAttributes {
        face_box: FaceBox {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        },
        pose: HeadPose {
            pitch: pose.pitch,
            yaw: pose.yaw,
            roll: pose.roll,
        },
        occlusion,
        completeness,
    })
}

fn decode_completeness(raw: RawCompleteness) -> Result<Completeness, String> {
    let score = |part: &str, v: i64| {
        u8::try_from(v)
            .ok()
            .filter(|s| *s <= 100)
            .ok_or_else(|| format!("{part} completeness out of range: {v}"))
    };
    Ok(Completeness {
        eye: score("eye", raw.eye)?,
        mouth: score("mouth", raw.mouth)?,
        nose: score("nose", raw.nose)?,
    })
}
