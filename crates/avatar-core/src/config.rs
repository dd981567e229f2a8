//! Threshold policies.
//!
//! A [`ThresholdConfig`] is a plain value handed to every evaluation. Two
//! built-in presets are embedded at compile time from
//! `contrib/thresholds/*.toml`; anything else is loaded from TOML and
//! optionally adjusted with per-axis [`PoseOverrides`].

use crate::types::{GlassesState, MaskState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub const VENDOR_DEFAULT_PRESET: &str = "vendor-default";
pub const RELAXED_PRESET: &str = "relaxed";

const VENDOR_DEFAULT_TOML: &str = include_str!("../../../contrib/thresholds/vendor-default.toml");
const RELAXED_TOML: &str = include_str!("../../../contrib/thresholds/relaxed.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid threshold TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{axis} range is inverted: min {min} > max {max}")]
    InvertedRange { axis: &'static str, min: f64, max: f64 },
    #[error("{axis} range has a non-finite bound")]
    NonFinite { axis: &'static str },
    #[error("min_completeness must be at most 100, got {0}")]
    CompletenessOutOfRange(u8),
    #[error("unknown preset: {0} (known: vendor-default, relaxed)")]
    UnknownPreset(String),
}

/// Inclusive angle interval in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    pub min: f64,
    pub max: f64,
}

impl AngleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub const fn symmetric(limit: f64) -> Self {
        Self {
            min: -limit,
            max: limit,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, axis: &'static str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ConfigError::NonFinite { axis });
        }
        if self.min > self.max {
            return Err(ConfigError::InvertedRange {
                axis,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Policy applied by the rule engine. Never mutated during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub pitch_range: AngleRange,
    pub yaw_range: AngleRange,
    pub roll_range: AngleRange,
    pub allowed_mask_states: BTreeSet<MaskState>,
    pub allowed_glasses_states: BTreeSet<GlassesState>,
    pub reject_on_closed_eye: bool,
    /// Smallest accepted face box side, in whole pixels.
    #[serde(default)]
    pub min_face_side: u32,
    /// Minimum eye/mouth/nose completeness score; `None` disables the check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_completeness: Option<u8>,
}

impl ThresholdConfig {
    /// The vendor's recommended avatar policy: ±10° pitch and yaw, ±20° roll,
    /// bare face, no sunglasses, eyes open, face at least 20 px.
    pub fn vendor_default() -> Self {
        Self {
            pitch_range: AngleRange::symmetric(10.0),
            yaw_range: AngleRange::symmetric(10.0),
            roll_range: AngleRange::symmetric(20.0),
            allowed_mask_states: BTreeSet::from([MaskState::None]),
            allowed_glasses_states: BTreeSet::from([GlassesState::None, GlassesState::Plain]),
            reject_on_closed_eye: true,
            min_face_side: 20,
            min_completeness: None,
        }
    }

    /// Looser policy for casual profile pictures.
    pub fn relaxed() -> Self {
        Self {
            pitch_range: AngleRange::symmetric(20.0),
            yaw_range: AngleRange::symmetric(25.0),
            roll_range: AngleRange::symmetric(30.0),
            allowed_mask_states: BTreeSet::from([MaskState::None, MaskState::WornCorrectly]),
            allowed_glasses_states: BTreeSet::from([GlassesState::None, GlassesState::Plain]),
            reject_on_closed_eye: false,
            min_face_side: 0,
            min_completeness: None,
        }
    }

    /// Parse and validate a policy from TOML text.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: ThresholdConfig = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a policy file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&src)?;
        tracing::info!(path = %path.display(), "loaded threshold config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pitch_range.validate("pitch")?;
        self.yaw_range.validate("yaw")?;
        self.roll_range.validate("roll")?;
        if let Some(t) = self.min_completeness {
            if t > 100 {
                return Err(ConfigError::CompletenessOutOfRange(t));
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

/// Per-request pose bound adjustments. Unset fields keep the base value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseOverrides {
    pub pitch_min: Option<f64>,
    pub pitch_max: Option<f64>,
    pub yaw_min: Option<f64>,
    pub yaw_max: Option<f64>,
    pub roll_min: Option<f64>,
    pub roll_max: Option<f64>,
}

impl PoseOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Resolve the overrides against `base`, returning a validated config.
    pub fn apply(&self, base: &ThresholdConfig) -> Result<ThresholdConfig, ConfigError> {
        let mut config = base.clone();
        override_range(&mut config.pitch_range, self.pitch_min, self.pitch_max);
        override_range(&mut config.yaw_range, self.yaw_min, self.yaw_max);
        override_range(&mut config.roll_range, self.roll_min, self.roll_max);
        config.validate()?;
        Ok(config)
    }
}

fn override_range(range: &mut AngleRange, min: Option<f64>, max: Option<f64>) {
    if let Some(min) = min {
        range.min = min;
    }
    if let Some(max) = max {
        range.max = max;
    }
}

/// A named built-in policy.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub config: ThresholdConfig,
}

static PRESETS: OnceLock<Vec<Preset>> = OnceLock::new();

fn preset_table() -> &'static Vec<Preset> {
    PRESETS.get_or_init(|| {
        let mut table = Vec::new();
        for (name, description, src) in [
            (
                VENDOR_DEFAULT_PRESET,
                "vendor-recommended avatar policy (tight pose, bare face)",
                VENDOR_DEFAULT_TOML,
            ),
            (
                RELAXED_PRESET,
                "looser pose bounds, correctly worn masks allowed",
                RELAXED_TOML,
            ),
        ] {
            match ThresholdConfig::from_toml_str(src) {
                Ok(config) => table.push(Preset {
                    name,
                    description,
                    config,
                }),
                Err(e) => tracing::error!(preset = name, error = %e, "bad built-in preset TOML"),
            }
        }
        table
    })
}

/// Look up a built-in preset by name.
pub fn preset(name: &str) -> Result<&'static Preset, ConfigError> {
    preset_table()
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
}

pub fn list_presets() -> &'static [Preset] {
    preset_table()
}
