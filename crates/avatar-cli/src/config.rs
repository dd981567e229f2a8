use std::path::PathBuf;
use std::time::Duration;

use avatar_core::config::VENDOR_DEFAULT_PRESET;
use avatar_core::provider::MAX_ATTRIBUTE_FACES;
use avatar_core::RetryPolicy;

/// Process configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Built-in threshold preset name (default: vendor-default).
    pub preset: String,
    /// Threshold TOML file; takes precedence over `preset` when set.
    pub thresholds_path: Option<PathBuf>,
    /// Provider calls per image, including the first.
    pub max_attempts: u32,
    /// Pause between retries of a retryable provider error.
    pub retry_backoff_ms: u64,
    /// Faces requested from the provider.
    pub max_faces: u32,
}

impl Config {
    /// Load configuration from `AVATAR_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            preset: std::env::var("AVATAR_PRESET")
                .unwrap_or_else(|_| VENDOR_DEFAULT_PRESET.to_string()),
            thresholds_path: std::env::var("AVATAR_THRESHOLDS_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            max_attempts: env_u32("AVATAR_MAX_ATTEMPTS", 3),
            retry_backoff_ms: env_u64("AVATAR_RETRY_BACKOFF_MS", 200),
            max_faces: env_u32("AVATAR_MAX_FACES", MAX_ATTRIBUTE_FACES),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
