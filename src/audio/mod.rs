// Audio playback module
// Uses Symphonia for decoding and cpal for output

pub mod codec;
pub mod decoder;
pub mod device;
pub mod memory;
pub mod notify;
pub mod output;
pub mod player;
pub mod sink;
pub mod sources;
mod stream;

pub use codec::{CodecProvider, CodecStream, SymphoniaProvider};
pub use decoder::{Track, TrackDecoder};
pub use device::{AudioDevice, DeviceError};
pub use memory::MemoryDevice;
pub use notify::{ChannelNotifier, CompletionNotifier};
pub use output::CpalDevice;
pub use player::{Player, SessionId, TransportState};
