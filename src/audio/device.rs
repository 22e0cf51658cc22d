// Audio device boundary
// The player only talks to the device through this trait, so the same
// streaming engine drives cpal in production and an in-memory device in tests.

use std::fmt;
use thiserror::Error;

/// Handle to a playback source owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// Handle to a PCM buffer owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Layout tag attached to uploaded buffer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Mono16,
    Stereo16,
}

impl SampleFormat {
    pub fn channels(self) -> usize {
        match self {
            SampleFormat::Mono16 => 1,
            SampleFormat::Stereo16 => 2,
        }
    }
}

/// Transport state of a device source, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Unknown {0}")]
    UnknownSource(SourceId),

    #[error("Unknown {0}")]
    UnknownBuffer(BufferId),

    #[error("{0} has no data")]
    EmptyBuffer(BufferId),

    #[error("No processed buffers to unqueue")]
    QueueEmpty,

    #[error("Unsupported device configuration: {0}")]
    Unsupported(String),

    #[error("Device backend error: {0}")]
    Backend(String),
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Operations the streaming engine needs from an audio output device.
///
/// Semantics follow the classic queued-source model: buffers are queued on a
/// source, the device marks them processed once played, and the caller
/// unqueues processed buffers to refill them. A playing source whose queue
/// runs dry stops on its own.
pub trait AudioDevice: Send + Sync {
    fn create_source(&self) -> DeviceResult<SourceId>;
    fn delete_source(&self, source: SourceId) -> DeviceResult<()>;

    fn create_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>>;
    fn delete_buffers(&self, buffers: &[BufferId]) -> DeviceResult<()>;

    /// Upload interleaved 16-bit samples into a buffer.
    fn buffer_data(
        &self,
        buffer: BufferId,
        format: SampleFormat,
        data: &[i16],
        sample_rate: u32,
    ) -> DeviceResult<()>;

    fn queue_buffers(&self, source: SourceId, buffers: &[BufferId]) -> DeviceResult<()>;

    /// Remove `count` processed buffers from the front of the queue.
    fn unqueue_buffers(&self, source: SourceId, count: usize) -> DeviceResult<Vec<BufferId>>;

    fn play(&self, source: SourceId) -> DeviceResult<()>;
    fn pause(&self, source: SourceId) -> DeviceResult<()>;
    fn stop(&self, source: SourceId) -> DeviceResult<()>;

    /// Number of queued buffers the device has finished playing.
    fn buffers_processed(&self, source: SourceId) -> DeviceResult<usize>;
    fn source_state(&self, source: SourceId) -> DeviceResult<SourceState>;
    fn set_gain(&self, source: SourceId, gain: f32) -> DeviceResult<()>;
}
