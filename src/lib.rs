// songstream - streaming playback of compressed audio tracks
// Module declarations
pub mod audio;
pub mod error;
pub mod logging;
pub mod settings;

pub use audio::{Player, SessionId, TransportState};
pub use error::{PlaybackError, Result};
pub use settings::PlaybackSettings;
