//! Avatar validity rules.
//!
//! [`evaluate`] is a pure function of a normalized provider payload and a
//! [`ThresholdConfig`]. Every failing rule contributes a reason; reasons are
//! emitted in a fixed order: box, pitch, yaw, roll, mask, glasses, eye,
//! completeness.

use crate::config::{AngleRange, ThresholdConfig};
use crate::types::{Completeness, EyeState, FaceAttributes, FaceAttributesResponse, FaceBox};
use serde::{Deserialize, Serialize};

pub const REASON_NO_FACE: &str = "no face detected";
pub const REASON_INVALID_BOX: &str = "invalid face box";
pub const REASON_EYES_CLOSED: &str = "eyes closed";
pub const REASON_NO_ATTRIBUTES: &str = "face attributes unavailable";

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_valid: bool,
    pub face_count: usize,
    /// Empty iff `is_valid`.
    pub reasons: Vec<String>,
    /// The evaluated face; `None` unless exactly one face was present.
    pub attributes: Option<FaceAttributes>,
}

impl Verdict {
    fn rejected(face_count: usize, reason: String) -> Self {
        Self {
            is_valid: false,
            face_count,
            reasons: vec![reason],
            attributes: None,
        }
    }
}

/// Decide whether `payload` contains exactly one acceptable face.
pub fn evaluate(payload: &FaceAttributesResponse, config: &ThresholdConfig) -> Verdict {
    let verdict = match (payload.face_count(), payload.faces.as_slice()) {
        (0, _) => Verdict::rejected(0, REASON_NO_FACE.to_string()),
        (1, [face]) => {
            let reasons = check_face(face, config);
            Verdict {
                is_valid: reasons.is_empty(),
                face_count: 1,
                reasons,
                attributes: Some(face.clone()),
            }
        }
        (1, _) => Verdict::rejected(1, REASON_NO_ATTRIBUTES.to_string()),
        (count, _) => Verdict::rejected(count, format!("multiple faces detected ({count})")),
    };

    tracing::debug!(
        valid = verdict.is_valid,
        faces = verdict.face_count,
        reasons = ?verdict.reasons,
        "avatar evaluated"
    );
    verdict
}

fn check_face(face: &FaceAttributes, config: &ThresholdConfig) -> Vec<String> {
    let mut reasons = Vec::new();

    if !box_is_sane(&face.face_box, config.min_face_side) {
        reasons.push(REASON_INVALID_BOX.to_string());
    }

    let pose = &face.pose;
    check_axis(&mut reasons, "pitch", pose.pitch, &config.pitch_range);
    check_axis(&mut reasons, "yaw", pose.yaw, &config.yaw_range);
    check_axis(&mut reasons, "roll", pose.roll, &config.roll_range);

    let occlusion = &face.occlusion;
    if !config.allowed_mask_states.contains(&occlusion.mask) {
        reasons.push(format!("mask state not allowed: {}", occlusion.mask));
    }
    if !config.allowed_glasses_states.contains(&occlusion.glasses) {
        reasons.push(format!("glasses state not allowed: {}", occlusion.glasses));
    }
    if config.reject_on_closed_eye && occlusion.eye_state == EyeState::Closed {
        reasons.push(REASON_EYES_CLOSED.to_string());
    }

    if let (Some(threshold), Some(scores)) = (config.min_completeness, face.completeness) {
        check_completeness(&mut reasons, &scores, threshold);
    }

    reasons
}

fn box_is_sane(face_box: &FaceBox, min_side: u32) -> bool {
    let min_side = i64::from(min_side);
    face_box.width > 0
        && face_box.height > 0
        && i64::from(face_box.width) >= min_side
        && i64::from(face_box.height) >= min_side
}

// A NaN angle is outside every range.
fn check_axis(reasons: &mut Vec<String>, axis: &str, value: f64, range: &AngleRange) {
    if !range.contains(value) {
        reasons.push(format!(
            "{axis} out of range: {value} not in [{},{}]",
            range.min, range.max
        ));
    }
}

fn check_completeness(reasons: &mut Vec<String>, scores: &Completeness, threshold: u8) {
    for (part, score) in [("eye", scores.eye), ("mouth", scores.mouth), ("nose", scores.nose)] {
        if score < threshold {
            reasons.push(format!("{part} completeness too low: {score} < {threshold}"));
        }
    }
}
