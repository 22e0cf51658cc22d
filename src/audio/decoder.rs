// Decoder adapter
// Turns a codec stream into fixed-capacity PCM chunks for the output buffers

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::codec::{CodecProvider, CodecStream};
use super::device::SampleFormat;
use crate::error::{PlaybackError, Result};

/// Samples per output buffer (interleaved, all channels).
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Widest channel layout the adapter accepts.
pub const MAX_CHANNELS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn from_count(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    pub fn sample_format(self) -> SampleFormat {
        match self {
            ChannelLayout::Mono => SampleFormat::Mono16,
            ChannelLayout::Stereo => SampleFormat::Stereo16,
        }
    }
}

/// Metadata of an opened track. Read-only once opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    path: PathBuf,
    sample_rate: u32,
    layout: ChannelLayout,
    total_samples: u64,
}

impl Track {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    /// Frames (samples per channel) the codec reported for the whole track.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn duration_ms(&self) -> u64 {
        (1000u128 * self.total_samples as u128 / self.sample_rate as u128) as u64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms())
    }
}

/// Decode progress. `offset` never decreases and `finished` never resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeCursor {
    pub offset: u64,
    pub finished: bool,
}

/// Interleaved 16-bit PCM ready for upload to an output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    samples: Vec<i16>,
    layout: ChannelLayout,
    sample_rate: u32,
}

impl PcmChunk {
    pub fn new(samples: Vec<i16>, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples,
            layout,
            sample_rate,
        }
    }

    pub fn empty(layout: ChannelLayout, sample_rate: u32) -> Self {
        Self::new(Vec::new(), layout, sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.layout.channels()
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn format(&self) -> SampleFormat {
        self.layout.sample_format()
    }
}

/// Owns one codec stream and hands out PCM chunks from it.
pub struct TrackDecoder {
    track: Track,
    codec: Option<Box<dyn CodecStream>>,
    cursor: DecodeCursor,
}

impl TrackDecoder {
    /// Open `path` through `provider`.
    ///
    /// Fails with [`PlaybackError::DecodeOpen`] when the codec rejects the
    /// file and [`PlaybackError::UnsupportedFormat`] for anything other than
    /// mono or stereo, or a zero sample rate.
    pub fn open(provider: &dyn CodecProvider, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let codec = provider.open(path).map_err(|e| PlaybackError::DecodeOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let channels = codec.channels();
        let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
            PlaybackError::UnsupportedFormat(format!("{} channels in {:?}", channels, path))
        })?;
        let sample_rate = codec.sample_rate();
        if sample_rate == 0 {
            return Err(PlaybackError::UnsupportedFormat(format!(
                "zero sample rate in {:?}",
                path
            )));
        }

        let track = Track {
            path: path.to_path_buf(),
            sample_rate,
            layout,
            total_samples: codec.total_samples(),
        };
        debug!(?path, sample_rate, channels, duration_ms = track.duration_ms(), "Opened track");

        Ok(Self {
            track,
            codec: Some(codec),
            cursor: DecodeCursor::default(),
        })
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn cursor(&self) -> DecodeCursor {
        self.cursor
    }

    /// Decode up to `capacity` samples.
    ///
    /// Keeps pulling from the codec until the chunk is full or a read yields
    /// nothing, which marks the cursor finished. Once finished every call
    /// returns an empty chunk.
    pub fn fill(&mut self, capacity: usize) -> PcmChunk {
        let layout = self.track.layout;
        let sample_rate = self.track.sample_rate;
        if self.cursor.finished {
            return PcmChunk::empty(layout, sample_rate);
        }
        let Some(codec) = self.codec.as_mut() else {
            self.cursor.finished = true;
            return PcmChunk::empty(layout, sample_rate);
        };

        let channels = layout.channels();
        // Whole frames only, and never less than one frame
        let capacity = (capacity - capacity % channels).max(channels);
        let mut data = vec![0i16; capacity];
        let mut read = 0;

        // Add to the chunk from the decoder until it's large enough
        while read < capacity {
            let produced = codec.read_interleaved(&mut data[read..]) * channels;
            if produced == 0 {
                self.cursor.finished = true;
                break;
            }
            read += produced.min(capacity - read);
        }
        data.truncate(read);

        self.cursor.offset = self.cursor.offset.max(codec.sample_offset());
        if self.cursor.finished
            && self.track.total_samples > 0
            && self.cursor.offset < self.track.total_samples
        {
            warn!(
                offset = self.cursor.offset,
                total = self.track.total_samples,
                "Codec exhausted before its reported length"
            );
        }

        PcmChunk::new(data, layout, sample_rate)
    }

    /// True once `fill` has seen the codec run dry.
    pub fn is_finished(&self) -> bool {
        self.cursor.finished
    }

    /// Release the codec. Safe to call more than once; later fills are empty.
    pub fn close(&mut self) {
        if self.codec.take().is_some() {
            debug!(path = ?self.track.path, "Closed codec");
        }
    }
}
