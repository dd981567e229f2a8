use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned face rectangle in source-image pixels.
///
/// `x`/`y` may be negative when the detector's expanded box extends past
/// the image edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Head orientation in signed degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Vertical tilt; negative means looking up.
    pub pitch: f64,
    /// Horizontal turn.
    pub yaw: f64,
    /// In-plane rotation.
    pub roll: f64,
}

impl HeadPose {
    pub fn frontal() -> Self {
        Self {
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaskState {
    None,
    /// Mask present but not covering the face.
    WornExposed,
    WornCoveringChin,
    WornCoveringMouth,
    WornCorrectly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GlassesState {
    None,
    Plain,
    Sunglasses,
}

/// Aggregated state of both eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EyeState {
    Open,
    Closed,
}

impl fmt::Display for MaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaskState::None => "None",
            MaskState::WornExposed => "WornExposed",
            MaskState::WornCoveringChin => "WornCoveringChin",
            MaskState::WornCoveringMouth => "WornCoveringMouth",
            MaskState::WornCorrectly => "WornCorrectly",
        };
        f.write_str(name)
    }
}

impl fmt::Display for GlassesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GlassesState::None => "None",
            GlassesState::Plain => "Plain",
            GlassesState::Sunglasses => "Sunglasses",
        };
        f.write_str(name)
    }
}

impl fmt::Display for EyeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EyeState::Open => "Open",
            EyeState::Closed => "Closed",
        })
    }
}

/// Occlusion-related flags for a single face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occlusion {
    pub mask: MaskState,
    pub glasses: GlassesState,
    pub eye_state: EyeState,
}

impl Occlusion {
    /// Bare face: no mask, no glasses, eyes open.
    pub fn clear() -> Self {
        Self {
            mask: MaskState::None,
            glasses: GlassesState::None,
            eye_state: EyeState::Open,
        }
    }
}

/// Per-part visibility scores in [0, 100]; lower means more occluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub eye: u8,
    pub mouth: u8,
    pub nose: u8,
}

/// Attributes of one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    #[serde(rename = "box")]
    pub face_box: FaceBox,
    pub pose: HeadPose,
    pub occlusion: Occlusion,
    /// Only present when the provider returned quality information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<Completeness>,
}

/// Source image information reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub model_version: Option<String>,
    pub request_id: Option<String>,
}

/// Normalized provider output.
///
/// Faces are ordered largest first, as the provider returns them; only the
/// first few (provider-capped) carry attribute data, so order matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributesResponse {
    pub faces: Vec<FaceAttributes>,
    /// Detected faces that came back without usable attribute data. Only
    /// counted when several faces were detected.
    #[serde(default)]
    pub unattributed_faces: usize,
    pub image: ImageMetadata,
}

impl FaceAttributesResponse {
    pub fn new(faces: Vec<FaceAttributes>) -> Self {
        Self {
            faces,
            unattributed_faces: 0,
            image: ImageMetadata::default(),
        }
    }

    /// Every detected face, with or without attributes.
    pub fn face_count(&self) -> usize {
        self.faces.len() + self.unattributed_faces
    }
}
