// Error types shared by the decoder adapter, output sink and player

use std::path::PathBuf;
use thiserror::Error;

use crate::audio::device::DeviceError;

/// Errors surfaced by playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The codec could not open or parse the file. The track is unusable.
    #[error("Failed to open {path:?}: {reason}")]
    DecodeOpen { path: PathBuf, reason: String },

    /// The file decoded but its layout cannot be played (e.g. 6 channels).
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// An output device call failed.
    #[error("Output error: {0}")]
    Output(#[from] DeviceError),

    /// A transport command was issued from a state that does not allow it.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlaybackError {
    /// Returns `true` for errors raised while opening a track.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::DecodeOpen { .. } | PlaybackError::UnsupportedFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message() {
        let err = PlaybackError::InvalidState {
            operation: "resume",
            state: "playing",
        };
        assert_eq!(err.to_string(), "Cannot resume while playing");
        assert!(!err.is_open_error());
    }

    #[test]
    fn test_device_error_converts() {
        let err: PlaybackError = DeviceError::QueueEmpty.into();
        assert!(matches!(err, PlaybackError::Output(DeviceError::QueueEmpty)));
    }
}
