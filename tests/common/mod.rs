// Shared fixtures for the playback integration tests
#![allow(dead_code)]

use hound::{WavSpec, WavWriter};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use songstream::audio::codec::{CodecOpenError, CodecProvider, CodecStream};
use songstream::PlaybackSettings;

pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Codec producing `frames` frames of a constant tone, 256 frames per read.
pub struct ScriptedStream {
    channels: usize,
    frames: u64,
    offset: u64,
}

impl CodecStream for ScriptedStream {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        TEST_SAMPLE_RATE
    }

    fn total_samples(&self) -> u64 {
        self.frames
    }

    fn read_interleaved(&mut self, out: &mut [i16]) -> usize {
        let room = (out.len() / self.channels).min(256) as u64;
        let n = room.min(self.frames - self.offset) as usize;
        out[..n * self.channels].fill(1000);
        self.offset += n as u64;
        n
    }

    fn sample_offset(&self) -> u64 {
        self.offset
    }
}

/// Opens [`ScriptedStream`]s of a fixed length and counts the opens.
pub struct ScriptedProvider {
    pub channels: usize,
    pub frames: u64,
    opens: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(channels: usize, frames: u64) -> Arc<Self> {
        Arc::new(Self {
            channels,
            frames,
            opens: AtomicUsize::new(0),
        })
    }

    /// Long enough to never finish during a test.
    pub fn endless() -> Arc<Self> {
        Self::new(2, u64::MAX / 4)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl CodecProvider for ScriptedProvider {
    fn open(&self, _path: &Path) -> Result<Box<dyn CodecStream>, CodecOpenError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            channels: self.channels,
            frames: self.frames,
            offset: 0,
        }))
    }
}

/// Defaults with a short poll interval so sessions settle quickly.
pub fn fast_settings() -> PlaybackSettings {
    PlaybackSettings {
        poll_interval_ms: 1,
        ..Default::default()
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Write a 16-bit WAV of `frames` frames holding a constant `level`.
pub fn write_wav(path: &Path, channels: u16, frames: u32, level: i16) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..frames as u64 * channels as u64 {
        writer.write_sample(level)?;
    }
    writer.finalize()?;
    Ok(())
}
