// Playback settings and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::audio::decoder::{DEFAULT_BUFFER_CAPACITY, MAX_CHANNELS};
use crate::error::{PlaybackError, Result};

/// Tunables for the streaming engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub version: i32, // Settings schema version for future migrations
    pub buffer_capacity: usize, // Samples per output buffer, all channels
    pub poll_interval_ms: u64,
    pub max_consecutive_output_failures: u32,
    pub drain_on_finish: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            version: 1,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            poll_interval_ms: 10,
            max_consecutive_output_failures: 8,
            drain_on_finish: true,
        }
    }
}

impl PlaybackSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        // Must hold at least one whole stereo frame
        if self.buffer_capacity < MAX_CHANNELS {
            return Err(PlaybackError::Settings(format!(
                "buffer_capacity must be at least {}",
                MAX_CHANNELS
            )));
        }
        if self.max_consecutive_output_failures == 0 {
            return Err(PlaybackError::Settings(
                "max_consecutive_output_failures must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: PlaybackSettings = serde_json::from_str(&content)
            .map_err(|e| PlaybackError::Settings(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;

        info!(?path, "Loaded settings");
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PlaybackError::Settings(format!("Failed to serialize settings: {}", e)))?;
        fs::write(path, content)?;

        info!(?path, "Saved settings");
        Ok(())
    }
}
