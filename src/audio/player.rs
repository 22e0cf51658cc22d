// Audio player implementation
// Transport state machine around one track, one streaming thread per session

use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::codec::CodecProvider;
use super::decoder::{Track, TrackDecoder};
use super::device::AudioDevice;
use super::notify::CompletionNotifier;
use super::sink::OutputSink;
use super::stream::{run_stream, StreamConfig, StreamContext};
use crate::error::{PlaybackError, Result};
use crate::settings::PlaybackSettings;

/// Identifies one `play` call's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Never played
    Idle,
    Playing,
    Paused,
    /// Stopped explicitly or played through
    Stopped,
}

impl TransportState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportState::Idle => "idle",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
            TransportState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between the player and its streaming thread.
///
/// `state` is also held across device transport calls, so a pause and the
/// streaming thread's restart check never interleave.
pub(crate) struct Shared {
    pub state: Mutex<TransportState>,
    pub running: AtomicBool,
    pub stream_error: Mutex<Option<PlaybackError>>,
}

struct ActiveSession {
    id: SessionId,
    sink: Arc<OutputSink>,
    handle: JoinHandle<()>,
}

/// Gain of a freshly created device source.
pub const DEFAULT_GAIN: f32 = 1.0;

pub struct Player {
    track: Track,
    provider: Arc<dyn CodecProvider>,
    device: Arc<dyn AudioDevice>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    settings: PlaybackSettings,
    shared: Arc<Shared>,
    // Decoder opened by `open`, handed to the first session
    ready: Option<TrackDecoder>,
    session: Option<ActiveSession>,
    next_session: u64,
    play_count: u32,
    volume: f32,
}

impl Player {
    /// Open a track for playback on `device`.
    ///
    /// Fails if the codec cannot open the file; no player exists then.
    pub fn open(
        path: impl AsRef<Path>,
        provider: Arc<dyn CodecProvider>,
        device: Arc<dyn AudioDevice>,
        settings: PlaybackSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let decoder = TrackDecoder::open(provider.as_ref(), path)?;

        Ok(Self {
            track: decoder.track().clone(),
            provider,
            device,
            notifier: None,
            volume: DEFAULT_GAIN,
            settings,
            shared: Arc::new(Shared {
                state: Mutex::new(TransportState::Idle),
                running: AtomicBool::new(false),
                stream_error: Mutex::new(None),
            }),
            ready: Some(decoder),
            session: None,
            next_session: 0,
            play_count: 0,
        })
    }

    /// Replace the completion notifier. Only one is bound at a time.
    pub fn set_notifier(&mut self, notifier: Arc<dyn CompletionNotifier>) {
        self.notifier = Some(notifier);
    }

    pub fn clear_notifier(&mut self) {
        self.notifier = None;
    }

    /// Start a new session from the beginning of the track.
    ///
    /// Allowed from `Idle` and `Stopped`.
    pub fn play(&mut self) -> Result<SessionId> {
        let state = self.state();
        if matches!(state, TransportState::Playing | TransportState::Paused) {
            return Err(PlaybackError::InvalidState {
                operation: "play",
                state: state.as_str(),
            });
        }

        // A session that played through still needs joining
        self.reap_session();

        let decoder = match self.ready.take() {
            Some(decoder) => decoder,
            None => TrackDecoder::open(self.provider.as_ref(), self.track.path())?,
        };

        // New sources start at the device default gain
        let sink = Arc::new(OutputSink::open(Arc::clone(&self.device))?);

        self.next_session += 1;
        let id = SessionId(self.next_session);
        *self.shared.stream_error.lock() = None;
        {
            let mut state = self.shared.state.lock();
            self.shared.running.store(true, Ordering::Release);
            *state = TransportState::Playing;
        }

        let ctx = StreamContext {
            session: id,
            decoder,
            sink: Arc::clone(&sink),
            shared: Arc::clone(&self.shared),
            notifier: self.notifier.clone(),
            config: StreamConfig {
                capacity: self.settings.buffer_capacity,
                poll_interval: self.settings.poll_interval(),
                max_failures: self.settings.max_consecutive_output_failures,
                drain: self.settings.drain_on_finish,
            },
        };

        let spawned = thread::Builder::new()
            .name(format!("stream-{}", id))
            .spawn(move || run_stream(ctx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let mut state = self.shared.state.lock();
                self.shared.running.store(false, Ordering::Release);
                *state = TransportState::Stopped;
                drop(state);
                if let Err(release_err) = sink.release() {
                    warn!(session = %id, "Failed to release output session: {}", release_err);
                }
                return Err(e.into());
            }
        };

        self.play_count += 1;
        self.session = Some(ActiveSession { id, sink, handle });
        info!(session = %id, track = %self.track.name(), "Playing");
        Ok(id)
    }

    pub fn pause(&mut self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if *state != TransportState::Playing {
            return Err(PlaybackError::InvalidState {
                operation: "pause",
                state: state.as_str(),
            });
        }
        if let Some(session) = self.session.as_ref() {
            session.sink.pause()?;
        }
        *state = TransportState::Paused;
        debug!("Paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if *state != TransportState::Paused {
            return Err(PlaybackError::InvalidState {
                operation: "resume",
                state: state.as_str(),
            });
        }
        if let Some(session) = self.session.as_ref() {
            session.sink.play()?;
        }
        *state = TransportState::Playing;
        debug!("Resumed");
        Ok(())
    }

    /// Stop the current session and wait for its streaming thread to exit.
    ///
    /// Device resources are released before this returns. A no-op on a
    /// player that never played.
    ///
    /// There is no timeout: a codec or device call that never returns keeps
    /// the streaming thread, and therefore this call, from finishing.
    pub fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            let mut state = self.shared.state.lock();
            if *state != TransportState::Idle {
                *state = TransportState::Stopped;
                self.play_count = 0;
            }
            return Ok(());
        };

        {
            let mut state = self.shared.state.lock();
            if self.shared.running.swap(false, Ordering::AcqRel) {
                if let Err(e) = session.sink.stop() {
                    warn!(session = %session.id, "Device stop failed: {}", e);
                }
            }
            *state = TransportState::Stopped;
        }

        if session.handle.join().is_err() {
            warn!(session = %session.id, "Streaming thread panicked");
        }
        // The thread releases on exit; this covers a thread that never got that far
        if let Err(e) = session.sink.release() {
            warn!(session = %session.id, "Failed to release output session: {}", e);
        }

        self.play_count = 0;
        info!(session = %session.id, "Stopped");
        Ok(())
    }

    /// Set the gain (0.0-1.0) of the live session's source.
    ///
    /// The value is remembered for [`Player::volume`], but every new session
    /// starts at the device default.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        let _state = self.shared.state.lock();
        if let Some(session) = self.session.as_ref() {
            if self.shared.running.load(Ordering::Acquire) {
                session.sink.set_gain(volume)?;
            }
        }
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn state(&self) -> TransportState {
        *self.shared.state.lock()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == TransportState::Paused
    }

    /// Successful plays since the last stop.
    pub fn play_count(&self) -> u32 {
        self.play_count
    }

    /// Session of the most recent play, until it is stopped.
    pub fn session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// True while a streaming thread for this player is still running.
    pub fn is_streaming(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn name(&self) -> String {
        self.track.name()
    }

    pub fn file_path(&self) -> PathBuf {
        self.track.path().to_path_buf()
    }

    pub fn duration(&self) -> Duration {
        self.track.duration()
    }

    /// Always zero: playback position is not tracked.
    pub fn position(&self) -> Duration {
        Duration::ZERO
    }

    /// Always false: a plain file carries no DRM.
    pub fn is_protected(&self) -> bool {
        false
    }

    /// Always false, ratings are not read from the file.
    pub fn is_rated(&self) -> bool {
        false
    }

    /// Always 0.
    pub fn rating(&self) -> u32 {
        0
    }

    /// Always 0, tags are not read.
    pub fn track_number(&self) -> u32 {
        0
    }

    /// The output error that ended the last session early, if any.
    pub fn take_stream_error(&self) -> Option<PlaybackError> {
        self.shared.stream_error.lock().take()
    }

    /// Join a session whose thread already ended the session on its own.
    fn reap_session(&mut self) {
        if let Some(session) = self.session.take() {
            if session.handle.join().is_err() {
                warn!(session = %session.id, "Streaming thread panicked");
            }
            if let Err(e) = session.sink.release() {
                warn!(session = %session.id, "Failed to release output session: {}", e);
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop player on drop: {}", e);
        }
    }
}
