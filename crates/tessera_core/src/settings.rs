//! Allocator settings
//!
//! Loaded from JSON; every field has a default so partial files are fine.

use crate::align::Alignment;
use crate::ring::MAX_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings")]
    Parse(#[from] serde_json::Error),

    #[error("ring_depth must be at least 1")]
    ZeroRingDepth,

    #[error("buffer_size must be non-zero")]
    ZeroBufferSize,

    #[error("buffer_size {0} exceeds the {max} byte limit", max = MAX_BUFFER_SIZE)]
    BufferTooLarge(u64),

    #[error("alignment {0} is not a power of two")]
    BadAlignment(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorSettings {
    /// Number of backing buffers; should exceed the GPU's frame queue depth.
    pub ring_depth: u8,
    /// Bytes per backing buffer, sized for the worst-case frame.
    pub buffer_size: u64,
    /// Override for the target alignment, in bytes.
    pub alignment: Option<u64>,
    /// Frames of usage history to keep.
    pub history_len: usize,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            ring_depth: 3,
            buffer_size: 4 * 1024 * 1024,
            alignment: None,
            history_len: 120,
        }
    }
}

impl AllocatorSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), ?settings, "loaded allocator settings");
        Ok(settings)
    }

    pub fn to_json_pretty(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ring_depth == 0 {
            return Err(SettingsError::ZeroRingDepth);
        }
        if self.buffer_size == 0 {
            return Err(SettingsError::ZeroBufferSize);
        }
        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(SettingsError::BufferTooLarge(self.buffer_size));
        }
        self.resolved_alignment()?;
        Ok(())
    }

    /// The configured alignment, or the target default.
    pub fn resolved_alignment(&self) -> Result<Alignment, SettingsError> {
        match self.alignment {
            Some(bytes) => Alignment::new(bytes).ok_or(SettingsError::BadAlignment(bytes)),
            None => Ok(Alignment::for_target()),
        }
    }
}
