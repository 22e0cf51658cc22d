// Headless audio device
// Plays queued buffers instantly when polled. Used for --null-output and as
// the device behind the integration tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::device::{
    AudioDevice, BufferId, DeviceError, DeviceResult, SampleFormat, SourceId, SourceState,
};
use super::sources::{BufferData, SourceTable};

#[derive(Debug, Default)]
struct Counters {
    play_commands: HashMap<SourceId, usize>,
    uploaded_samples: usize,
}

/// In-memory [`AudioDevice`].
///
/// With auto-consume on (the default) every pending buffer of a playing
/// source counts as processed the next time `buffers_processed` is called.
/// Turn it off to hold buffers on the device until [`MemoryDevice::consume`].
#[derive(Debug)]
pub struct MemoryDevice {
    table: Mutex<SourceTable>,
    counters: Mutex<Counters>,
    auto_consume: AtomicBool,
    failing_polls: AtomicUsize,
    failing_uploads: AtomicUsize,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(SourceTable::new()),
            counters: Mutex::new(Counters::default()),
            auto_consume: AtomicBool::new(true),
            failing_polls: AtomicUsize::new(0),
            failing_uploads: AtomicUsize::new(0),
        }
    }

    pub fn set_auto_consume(&self, enabled: bool) {
        self.auto_consume.store(enabled, Ordering::SeqCst);
    }

    /// Play through everything pending on `source` right now.
    pub fn consume(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().consume_all(source)
    }

    /// Make the next `count` processed-buffer polls fail.
    pub fn fail_next_polls(&self, count: usize) {
        self.failing_polls.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` buffer uploads fail. Failed uploads store nothing.
    pub fn fail_next_uploads(&self, count: usize) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    /// Simulate the device stopping a source behind the caller's back.
    pub fn force_stop(&self, source: SourceId) -> DeviceResult<()> {
        let mut table = self.table.lock();
        table.consume_all(source)?;
        table.stop(source)
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.table.lock().source_ids()
    }

    pub fn live_sources(&self) -> usize {
        self.table.lock().source_count()
    }

    pub fn live_buffers(&self) -> usize {
        self.table.lock().buffer_count()
    }

    pub fn play_commands(&self, source: SourceId) -> usize {
        self.counters
            .lock()
            .play_commands
            .get(&source)
            .copied()
            .unwrap_or(0)
    }

    pub fn uploaded_samples(&self) -> usize {
        self.counters.lock().uploaded_samples
    }

    pub fn gain(&self, source: SourceId) -> DeviceResult<f32> {
        Ok(self.table.lock().source(source)?.gain)
    }

    fn inject_fault(counter: &AtomicUsize, call: &str) -> DeviceResult<()> {
        let injected =
            counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(DeviceError::Backend(format!("injected {} failure", call)));
        }
        Ok(())
    }
}

impl AudioDevice for MemoryDevice {
    fn create_source(&self) -> DeviceResult<SourceId> {
        let id = self.table.lock().create_source();
        self.counters.lock().play_commands.insert(id, 0);
        Ok(id)
    }

    fn delete_source(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().delete_source(source)
    }

    fn create_buffers(&self, count: usize) -> DeviceResult<Vec<BufferId>> {
        Ok(self.table.lock().create_buffers(count))
    }

    fn delete_buffers(&self, buffers: &[BufferId]) -> DeviceResult<()> {
        self.table.lock().delete_buffers(buffers)
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        format: SampleFormat,
        data: &[i16],
        sample_rate: u32,
    ) -> DeviceResult<()> {
        Self::inject_fault(&self.failing_uploads, "upload")?;
        self.table.lock().buffer_data(
            buffer,
            BufferData {
                format,
                samples: data.to_vec(),
                sample_rate,
            },
        )?;
        self.counters.lock().uploaded_samples += data.len();
        Ok(())
    }

    fn queue_buffers(&self, source: SourceId, buffers: &[BufferId]) -> DeviceResult<()> {
        self.table.lock().queue_buffers(source, buffers)
    }

    fn unqueue_buffers(&self, source: SourceId, count: usize) -> DeviceResult<Vec<BufferId>> {
        self.table.lock().unqueue_buffers(source, count)
    }

    fn play(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().play(source)?;
        *self
            .counters
            .lock()
            .play_commands
            .entry(source)
            .or_insert(0) += 1;
        Ok(())
    }

    fn pause(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().pause(source)
    }

    fn stop(&self, source: SourceId) -> DeviceResult<()> {
        self.table.lock().stop(source)
    }

    fn buffers_processed(&self, source: SourceId) -> DeviceResult<usize> {
        Self::inject_fault(&self.failing_polls, "poll")?;
        let mut table = self.table.lock();
        if self.auto_consume.load(Ordering::SeqCst) {
            table.consume_all(source)?;
        }
        Ok(table.source(source)?.processed())
    }

    fn source_state(&self, source: SourceId) -> DeviceResult<SourceState> {
        Ok(self.table.lock().source(source)?.state)
    }

    fn set_gain(&self, source: SourceId, gain: f32) -> DeviceResult<()> {
        self.table.lock().set_gain(source, gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_consume_marks_buffers_processed() {
        let device = MemoryDevice::new();
        let source = device.create_source().unwrap();
        let buffers = device.create_buffers(2).unwrap();
        for b in &buffers {
            device.buffer_data(*b, SampleFormat::Stereo16, &[0; 8], 44100).unwrap();
        }
        device.queue_buffers(source, &buffers).unwrap();
        assert_eq!(device.buffers_processed(source).unwrap(), 0);

        device.play(source).unwrap();
        assert_eq!(device.buffers_processed(source).unwrap(), 2);
        assert_eq!(device.source_state(source).unwrap(), SourceState::Stopped);
        assert_eq!(device.play_commands(source), 1);
        assert_eq!(device.uploaded_samples(), 16);
    }

    #[test]
    fn test_held_buffers_stay_pending() {
        let device = MemoryDevice::new();
        device.set_auto_consume(false);
        let source = device.create_source().unwrap();
        let buffer = device.create_buffers(1).unwrap()[0];
        device.buffer_data(buffer, SampleFormat::Mono16, &[1, 2], 8000).unwrap();
        device.queue_buffers(source, &[buffer]).unwrap();
        device.play(source).unwrap();

        assert_eq!(device.buffers_processed(source).unwrap(), 0);
        device.consume(source).unwrap();
        assert_eq!(device.buffers_processed(source).unwrap(), 1);
    }

    #[test]
    fn test_injected_poll_failures() {
        let device = MemoryDevice::new();
        let source = device.create_source().unwrap();
        device.fail_next_polls(2);
        assert!(device.buffers_processed(source).is_err());
        assert!(device.buffers_processed(source).is_err());
        assert!(device.buffers_processed(source).is_ok());
    }

    #[test]
    fn test_injected_upload_failure_stores_nothing() {
        let device = MemoryDevice::new();
        let buffer = device.create_buffers(1).unwrap()[0];
        device.fail_next_uploads(1);
        assert!(device.buffer_data(buffer, SampleFormat::Mono16, &[1, 2], 8000).is_err());
        assert_eq!(device.uploaded_samples(), 0);

        device.buffer_data(buffer, SampleFormat::Mono16, &[1, 2], 8000).unwrap();
        assert_eq!(device.uploaded_samples(), 2);
    }

    #[test]
    fn test_sources_lists_live_sources() {
        let device = MemoryDevice::new();
        let a = device.create_source().unwrap();
        let b = device.create_source().unwrap();
        device.delete_source(a).unwrap();
        assert_eq!(device.sources(), vec![b]);
        assert_eq!(device.live_sources(), 1);
    }
}
