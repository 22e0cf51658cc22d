// Codec boundary and the Symphonia-backed implementation
// Decodes compressed audio files to interleaved 16-bit PCM

use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Reasons a codec refuses to open a file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecOpenError {
    #[error("Failed to open file: {0}")]
    Io(String),

    #[error("Failed to probe file format: {0}")]
    Unrecognized(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Failed to create decoder: {0}")]
    Codec(String),

    #[error("Missing stream parameter: {0}")]
    MissingParameter(&'static str),
}

/// An open, decodable audio stream.
///
/// Dropping the stream releases the underlying codec handle.
pub trait CodecStream: Send {
    fn channels(&self) -> usize;
    fn sample_rate(&self) -> u32;

    /// Total decodable frames (samples per channel), 0 if unknown.
    fn total_samples(&self) -> u64;

    /// Decode interleaved samples into `out`, at most `out.len() / channels`
    /// frames. Returns the number of frames produced; 0 means exhausted.
    fn read_interleaved(&mut self, out: &mut [i16]) -> usize;

    /// Frames handed out so far.
    fn sample_offset(&self) -> u64;
}

/// Opens [`CodecStream`]s by path.
pub trait CodecProvider: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn CodecStream>, CodecOpenError>;
}

/// [`CodecProvider`] using Symphonia's default format and codec registries.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaProvider;

impl CodecProvider for SymphoniaProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn CodecStream>, CodecOpenError> {
        Ok(Box::new(SymphoniaStream::open(path)?))
    }
}

pub struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    total_frames: u64,
    sample_buf: Option<SampleBuffer<i16>>,
    pending: Vec<i16>,
    pending_pos: usize,
    frames_read: u64,
    exhausted: bool,
}

impl SymphoniaStream {
    /// Open an audio file and prepare for decoding
    pub fn open(path: &Path) -> Result<Self, CodecOpenError> {
        let file = File::open(path).map_err(|e| CodecOpenError::Io(e.to_string()))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint using the file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| CodecOpenError::Unrecognized(e.to_string()))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(CodecOpenError::NoAudioTrack)?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(CodecOpenError::MissingParameter("sample rate"))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .ok_or(CodecOpenError::MissingParameter("channel layout"))?;
        let total_frames = track.codec_params.n_frames.unwrap_or(0);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| CodecOpenError::Codec(e.to_string()))?;

        debug!(?path, sample_rate, channels, total_frames, "Opened codec stream");

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            total_frames,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            frames_read: 0,
            exhausted: false,
        })
    }

    /// Decode the next packet into `pending`. Returns false at end of stream.
    fn decode_next(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.exhausted = true;
                    return false;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    error!("Failed to read packet, ending stream: {}", e);
                    self.exhausted = true;
                    return false;
                }
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    let reuse = self
                        .sample_buf
                        .as_ref()
                        .map(|b| b.capacity() as u64 >= capacity * spec.channels.count() as u64)
                        .unwrap_or(false);
                    if !reuse {
                        self.sample_buf = Some(SampleBuffer::<i16>::new(capacity, spec));
                    }
                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        self.pending.clear();
                        self.pending.extend_from_slice(buf.samples());
                        self.pending_pos = 0;
                    }
                    return true;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping): {}", e);
                    continue;
                }
                Err(e) => {
                    error!("Decode failed, ending stream: {}", e);
                    self.exhausted = true;
                    return false;
                }
            }
        }
    }
}

impl CodecStream for SymphoniaStream {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_samples(&self) -> u64 {
        self.total_frames
    }

    fn read_interleaved(&mut self, out: &mut [i16]) -> usize {
        let channels = self.channels.max(1);
        let wanted = out.len() - out.len() % channels;
        let mut written = 0;

        while written < wanted {
            if self.pending_pos >= self.pending.len() {
                if !self.decode_next() {
                    break;
                }
                continue;
            }
            let n = (wanted - written).min(self.pending.len() - self.pending_pos);
            out[written..written + n]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            self.pending_pos += n;
            written += n;
        }

        let frames = written / channels;
        self.frames_read += frames as u64;
        frames
    }

    fn sample_offset(&self) -> u64 {
        self.frames_read
    }
}
