// Output sink
// Owns one device source and its double-buffer pool for a playback session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::decoder::PcmChunk;
use super::device::{AudioDevice, BufferId, DeviceResult, SourceId, SourceState};

/// Output buffers per session.
pub const BUFFER_COUNT: usize = 2;

/// The fixed pair of device buffers a session alternates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPool {
    buffers: [BufferId; BUFFER_COUNT],
}

impl BufferPool {
    pub fn buffers(&self) -> &[BufferId] {
        &self.buffers
    }

    pub fn contains(&self, buffer: BufferId) -> bool {
        self.buffers.contains(&buffer)
    }
}

/// Source plus buffer pool on a device, released exactly once.
///
/// Release happens on [`OutputSink::release`] or on drop, whichever comes
/// first. Every release step runs even if an earlier one fails.
pub struct OutputSink {
    device: Arc<dyn AudioDevice>,
    source: SourceId,
    pool: BufferPool,
    released: AtomicBool,
}

impl OutputSink {
    /// Allocate a source and [`BUFFER_COUNT`] buffers on `device`.
    pub fn open(device: Arc<dyn AudioDevice>) -> DeviceResult<Self> {
        let source = device.create_source()?;
        let buffers = match device.create_buffers(BUFFER_COUNT) {
            Ok(b) if b.len() == BUFFER_COUNT => b,
            Ok(b) => {
                let _ = device.delete_buffers(&b);
                let _ = device.delete_source(source);
                return Err(super::device::DeviceError::Backend(format!(
                    "Device returned {} buffers, expected {}",
                    b.len(),
                    BUFFER_COUNT
                )));
            }
            Err(e) => {
                let _ = device.delete_source(source);
                return Err(e);
            }
        };

        let pool = BufferPool {
            buffers: [buffers[0], buffers[1]],
        };
        debug!(%source, buffers = ?pool.buffers, "Allocated output session");

        Ok(Self {
            device,
            source,
            pool,
            released: AtomicBool::new(false),
        })
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Upload a chunk into one of this sink's buffers.
    pub fn upload(&self, buffer: BufferId, chunk: &PcmChunk) -> DeviceResult<()> {
        self.device
            .buffer_data(buffer, chunk.format(), chunk.samples(), chunk.sample_rate())
    }

    pub fn queue(&self, buffers: &[BufferId]) -> DeviceResult<()> {
        self.device.queue_buffers(self.source, buffers)
    }

    pub fn unqueue(&self, count: usize) -> DeviceResult<Vec<BufferId>> {
        self.device.unqueue_buffers(self.source, count)
    }

    pub fn processed(&self) -> DeviceResult<usize> {
        self.device.buffers_processed(self.source)
    }

    pub fn state(&self) -> DeviceResult<SourceState> {
        self.device.source_state(self.source)
    }

    pub fn play(&self) -> DeviceResult<()> {
        self.device.play(self.source)
    }

    pub fn pause(&self) -> DeviceResult<()> {
        self.device.pause(self.source)
    }

    pub fn stop(&self) -> DeviceResult<()> {
        self.device.stop(self.source)
    }

    pub fn set_gain(&self, gain: f32) -> DeviceResult<()> {
        self.device.set_gain(self.source, gain)
    }

    /// Stop the source and delete it along with its buffers.
    ///
    /// Returns the first failure after attempting every step. Later calls
    /// are no-ops.
    pub fn release(&self) -> DeviceResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let steps = [
            self.device.stop(self.source),
            self.device.delete_source(self.source),
            self.device.delete_buffers(self.pool.buffers()),
        ];
        debug!(source = %self.source, "Released output session");
        steps.into_iter().collect::<DeviceResult<Vec<()>>>().map(|_| ())
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(source = %self.source, "Failed to release output session: {}", e);
        }
    }
}
