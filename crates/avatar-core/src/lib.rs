//! avatar-core — Avatar validity checks over cloud face-attribute results.
//!
//! The rule engine in [`rules`] is a pure function of a decoded provider
//! payload and a [`ThresholdConfig`]. Provider calls and verdict
//! persistence sit behind the [`AttributeProvider`] and [`ResultSink`]
//! traits.

pub mod checker;
pub mod config;
pub mod provider;
pub mod regression;
pub mod rules;
pub mod sink;
pub mod types;
pub mod vendor;

pub use checker::{CheckOutcome, Checker, RetryPolicy};
pub use config::{AngleRange, ConfigError, PoseOverrides, ThresholdConfig};
pub use provider::{
    AttributeCategory, AttributeProvider, ErrorClass, ImageRef, ProviderError, RecordedProvider,
};
pub use rules::{evaluate, Verdict};
pub use sink::{JsonLinesSink, MemorySink, ResultSink, SinkError, VerdictRecord};
pub use types::{
    Completeness, EyeState, FaceAttributes, FaceAttributesResponse, FaceBox, GlassesState,
    HeadPose, ImageMetadata, MaskState, Occlusion,
};
