// Software source/buffer bookkeeping shared by the cpal and in-memory devices

use std::collections::{HashMap, VecDeque};

use super::device::{BufferId, DeviceError, DeviceResult, SampleFormat, SourceId, SourceState};

/// Uploaded PCM data for one buffer.
#[derive(Debug, Clone)]
pub struct BufferData {
    pub format: SampleFormat,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl BufferData {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels()
    }
}

#[derive(Debug)]
pub struct SourceSlot {
    pub state: SourceState,
    pub gain: f32,
    queue: VecDeque<BufferId>,
    /// Leading entries of `queue` that have been played.
    processed: usize,
    /// Fractional frame position inside the current pending buffer.
    position: f64,
}

impl SourceSlot {
    fn new() -> Self {
        Self {
            state: SourceState::Initial,
            gain: 1.0,
            queue: VecDeque::new(),
            processed: 0,
            position: 0.0,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn pending(&self) -> usize {
        self.queue.len() - self.processed
    }

    fn current(&self) -> Option<BufferId> {
        self.queue.get(self.processed).copied()
    }

    fn rewind(&mut self) {
        self.processed = 0;
        self.position = 0.0;
    }

    /// Mark the current buffer as played. A playing source that runs out of
    /// pending buffers stops on its own.
    fn advance(&mut self) {
        if self.processed < self.queue.len() {
            self.processed += 1;
        }
        self.position = 0.0;
        if self.pending() == 0 && self.state == SourceState::Playing {
            self.state = SourceState::Stopped;
        }
    }
}

/// Sources and buffers of one device.
#[derive(Debug, Default)]
pub struct SourceTable {
    next_id: u32,
    sources: HashMap<SourceId, SourceSlot>,
    buffers: HashMap<BufferId, Option<BufferData>>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn source(&self, source: SourceId) -> DeviceResult<&SourceSlot> {
        self.sources.get(&source).ok_or(DeviceError::UnknownSource(source))
    }

    fn source_mut(&mut self, source: SourceId) -> DeviceResult<&mut SourceSlot> {
        self.sources
            .get_mut(&source)
            .ok_or(DeviceError::UnknownSource(source))
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.sources.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn create_source(&mut self) -> SourceId {
        let id = SourceId(self.next_id());
        self.sources.insert(id, SourceSlot::new());
        id
    }

    pub fn delete_source(&mut self, source: SourceId) -> DeviceResult<()> {
        self.sources
            .remove(&source)
            .map(|_| ())
            .ok_or(DeviceError::UnknownSource(source))
    }

    pub fn create_buffers(&mut self, count: usize) -> Vec<BufferId> {
        (0..count)
            .map(|_| {
                let id = BufferId(self.next_id());
                self.buffers.insert(id, None);
                id
            })
            .collect()
    }

    pub fn delete_buffers(&mut self, buffers: &[BufferId]) -> DeviceResult<()> {
        if let Some(missing) = buffers.iter().find(|b| !self.buffers.contains_key(b)) {
            return Err(DeviceError::UnknownBuffer(*missing));
        }
        for buffer in buffers {
            self.buffers.remove(buffer);
        }
        // Detach deleted buffers from any queue still referencing them
        for slot in self.sources.values_mut() {
            let before = slot.queue.len();
            slot.queue.retain(|b| !buffers.contains(b));
            if slot.queue.len() != before {
                slot.processed = slot.processed.min(slot.queue.len());
            }
        }
        Ok(())
    }

    pub fn buffer_data(&mut self, buffer: BufferId, data: BufferData) -> DeviceResult<()> {
        let slot = self
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        *slot = Some(data);
        Ok(())
    }

    pub fn buffer(&self, buffer: BufferId) -> Option<&BufferData> {
        self.buffers.get(&buffer).and_then(|b| b.as_ref())
    }

    pub fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> DeviceResult<()> {
        for buffer in buffers {
            match self.buffers.get(buffer) {
                None => return Err(DeviceError::UnknownBuffer(*buffer)),
                Some(None) => return Err(DeviceError::EmptyBuffer(*buffer)),
                Some(Some(_)) => {}
            }
        }
        let slot = self.source_mut(source)?;
        slot.queue.extend(buffers.iter().copied());
        Ok(())
    }

    pub fn unqueue_buffers(&mut self, source: SourceId, count: usize) -> DeviceResult<Vec<BufferId>> {
        let slot = self.source_mut(source)?;
        if count > slot.processed {
            return Err(DeviceError::QueueEmpty);
        }
        slot.processed -= count;
        Ok(slot.queue.drain(..count).collect())
    }

    pub fn play(&mut self, source: SourceId) -> DeviceResult<()> {
        let slot = self.source_mut(source)?;
        match slot.state {
            SourceState::Playing => {}
            SourceState::Paused => slot.state = SourceState::Playing,
            SourceState::Initial | SourceState::Stopped => {
                slot.rewind();
                slot.state = if slot.pending() > 0 {
                    SourceState::Playing
                } else {
                    SourceState::Stopped
                };
            }
        }
        Ok(())
    }

    pub fn pause(&mut self, source: SourceId) -> DeviceResult<()> {
        let slot = self.source_mut(source)?;
        if slot.state == SourceState::Playing {
            slot.state = SourceState::Paused;
        }
        Ok(())
    }

    pub fn stop(&mut self, source: SourceId) -> DeviceResult<()> {
        let slot = self.source_mut(source)?;
        if slot.state != SourceState::Initial {
            slot.state = SourceState::Stopped;
            slot.processed = slot.queue.len();
            slot.position = 0.0;
        }
        Ok(())
    }

    pub fn set_gain(&mut self, source: SourceId, gain: f32) -> DeviceResult<()> {
        self.source_mut(source)?.gain = gain.max(0.0);
        Ok(())
    }

    /// Play through every pending buffer of a playing source at once.
    pub fn consume_all(&mut self, source: SourceId) -> DeviceResult<()> {
        let slot = self.source_mut(source)?;
        while slot.state == SourceState::Playing && slot.pending() > 0 {
            slot.advance();
        }
        Ok(())
    }

    /// Mix every playing source into an interleaved f32 output block.
    ///
    /// Buffers are stepped at `buffer_rate / output_rate` frames per output
    /// frame (nearest sample). Mono is copied to every output channel; stereo
    /// feeds the first two.
    pub fn render(&mut self, out: &mut [f32], out_channels: usize, out_rate: u32) {
        out.iter_mut().for_each(|s| *s = 0.0);
        if out_channels == 0 || out_rate == 0 {
            return;
        }

        let Self {
            sources, buffers, ..
        } = self;

        for slot in sources.values_mut() {
            if slot.state != SourceState::Playing {
                continue;
            }
            'frames: for frame in out.chunks_mut(out_channels) {
                loop {
                    let Some(data) = slot
                        .current()
                        .and_then(|id| buffers.get(&id))
                        .and_then(|b| b.as_ref())
                    else {
                        slot.advance();
                        break 'frames;
                    };

                    let channels = data.format.channels();
                    let index = slot.position as usize;
                    if index >= data.frames() {
                        slot.advance();
                        if slot.state != SourceState::Playing {
                            break 'frames;
                        }
                        continue;
                    }

                    let base = index * channels;
                    for (ch, sample) in frame.iter_mut().enumerate() {
                        let src = if channels == 1 {
                            data.samples[base]
                        } else if ch < channels {
                            data.samples[base + ch]
                        } else {
                            0
                        };
                        *sample += src as f32 / 32768.0 * slot.gain;
                    }
                    slot.position += data.sample_rate as f64 / out_rate as f64;
                    break;
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}
