//! Sink configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// Queue depth used when no configuration is given.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Largest frame the [`FrameReader`](crate::frame::FrameReader) accepts by default (64 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Top-level sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// How many submitted-but-undrained frames may be outstanding.
    /// Fixed for the lifetime of the sink.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Upper bound on a single length-prefixed input frame
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_queue_capacity() -> usize { DEFAULT_QUEUE_CAPACITY }
fn default_max_frame_len() -> usize { DEFAULT_MAX_FRAME_LEN }

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl SinkConfig {
    /// Default config with a specific queue capacity.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..Self::default()
        }
    }

    /// Load a config from a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, SinkError> {
        let text = std::fs::read_to_string(path).map_err(|source| SinkError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SinkError> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| SinkError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.queue_capacity == 0 {
            return Err(SinkError::InvalidConfig {
                reason: "queue_capacity must be at least 1".into(),
            });
        }
        if self.max_frame_len == 0 {
            return Err(SinkError::InvalidConfig {
                reason: "max_frame_len must be at least 1".into(),
            });
        }
        Ok(())
    }
}
