// Streaming thread
// Keeps the session's two output buffers fed from the decoder until the track
// runs out or the player stops the session.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

use super::decoder::{PcmChunk, TrackDecoder};
use super::device::{BufferId, DeviceResult, SourceState};
use super::notify::CompletionNotifier;
use super::player::{SessionId, Shared, TransportState};
use super::sink::{OutputSink, BUFFER_COUNT};
use crate::error::PlaybackError;

pub(crate) struct StreamConfig {
    pub capacity: usize,
    pub poll_interval: Duration,
    pub max_failures: u32,
    pub drain: bool,
}

pub(crate) struct StreamContext {
    pub session: SessionId,
    pub decoder: TrackDecoder,
    pub sink: Arc<OutputSink>,
    pub shared: Arc<Shared>,
    pub notifier: Option<Arc<dyn CompletionNotifier>>,
    pub config: StreamConfig,
}

enum Exit {
    /// Decoder ran dry and everything queued was played
    Finished,
    /// The player cleared the running flag
    Stopped,
}

/// Ends the session on every exit path, panics included: clears the running
/// flag if it is still set and releases the sink.
struct SessionGuard {
    shared: Arc<Shared>,
    sink: Arc<OutputSink>,
    done: bool,
}

impl SessionGuard {
    /// Returns true when this thread, not `stop`, ended the session.
    fn end(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.done = true;

        let ended_here = {
            let mut state = self.shared.state.lock();
            let was_running = self.shared.running.swap(false, Ordering::AcqRel);
            if was_running {
                *state = TransportState::Stopped;
            }
            was_running
        };
        if let Err(e) = self.sink.release() {
            warn!("Failed to release output session: {}", e);
        }
        ended_here
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.end();
    }
}

pub(crate) fn run_stream(mut ctx: StreamContext) {
    let span = info_span!("stream", session = %ctx.session);
    let _enter = span.enter();

    let mut guard = SessionGuard {
        shared: Arc::clone(&ctx.shared),
        sink: Arc::clone(&ctx.sink),
        done: false,
    };

    let outcome = stream_loop(&mut ctx);
    ctx.decoder.close();
    let ended_here = guard.end();

    match outcome {
        Ok(Exit::Finished) if ended_here => {
            info!("Track finished");
            if let Some(notifier) = ctx.notifier.as_ref() {
                notifier.track_finished(ctx.session);
            }
        }
        Ok(Exit::Finished) | Ok(Exit::Stopped) => debug!("Stream stopped"),
        // Device calls racing a stop can fail; the session is over either way
        Err(e) if !ended_here => debug!("Stream stopped during output error: {}", e),
        Err(e) => {
            error!("Playback aborted: {}", e);
            *ctx.shared.stream_error.lock() = Some(e);
        }
    }
}

fn is_running(ctx: &StreamContext) -> bool {
    ctx.shared.running.load(Ordering::Acquire)
}

/// Buffers and audio held by the streaming thread between device calls.
struct Feeder {
    /// Buffers not on the device, refilled front first
    idle: VecDeque<BufferId>,
    /// Uploaded but not yet queued
    loaded: Vec<BufferId>,
    /// Decoded audio whose upload failed, retried before decoding more
    pending: Option<PcmChunk>,
    started: bool,
}

impl Feeder {
    fn new(buffers: &[BufferId]) -> Self {
        Self {
            idle: buffers.iter().copied().collect(),
            loaded: Vec::with_capacity(BUFFER_COUNT),
            pending: None,
            started: false,
        }
    }

    /// Nothing decoded is waiting to reach the device.
    fn is_flushed(&self) -> bool {
        self.pending.is_none() && self.loaded.is_empty()
    }

    fn all_idle(&self) -> bool {
        self.idle.len() == BUFFER_COUNT
    }
}

fn stream_loop(ctx: &mut StreamContext) -> Result<Exit, PlaybackError> {
    let mut feeder = Feeder::new(ctx.sink.pool().buffers());

    let mut failures = 0u32;
    loop {
        if !is_running(ctx) {
            return Ok(Exit::Stopped);
        }
        if ctx.decoder.is_finished()
            && feeder.is_flushed()
            && (!ctx.config.drain || feeder.all_idle())
        {
            return Ok(Exit::Finished);
        }

        match pump(ctx, &mut feeder) {
            Ok(()) => failures = 0,
            Err(e) => {
                failures += 1;
                if failures >= ctx.config.max_failures {
                    return Err(e.into());
                }
                warn!(failures, "Output error, continuing: {}", e);
            }
        }

        thread::sleep(ctx.config.poll_interval);
    }
}

/// One pass: take back played buffers, refill and queue them, then make sure
/// the source is playing.
///
/// The first successful pass fills both buffers and queues them in one batch
/// before the source starts.
fn pump(ctx: &mut StreamContext, feeder: &mut Feeder) -> DeviceResult<()> {
    if feeder.started {
        let processed = ctx.sink.processed()?;
        if processed > 0 {
            feeder.idle.extend(ctx.sink.unqueue(processed)?);
        }
    }

    load(ctx, feeder)?;
    if !feeder.loaded.is_empty() {
        ctx.sink.queue(&feeder.loaded)?;
        debug!(queued = feeder.loaded.len(), "Queued output buffers");
        feeder.loaded.clear();
    }
    feeder.started = true;

    recover(ctx, !feeder.all_idle())
}

/// Upload decoded audio into idle buffers, front first, until they are all
/// loaded or the track runs out.
fn load(ctx: &mut StreamContext, feeder: &mut Feeder) -> DeviceResult<()> {
    while let Some(&buffer) = feeder.idle.front() {
        if !is_running(ctx) {
            break;
        }
        let chunk = match feeder.pending.take() {
            Some(chunk) => chunk,
            None if ctx.decoder.is_finished() => break,
            None => {
                let chunk = ctx.decoder.fill(ctx.config.capacity);
                if chunk.is_empty() {
                    break;
                }
                chunk
            }
        };
        if let Err(e) = ctx.sink.upload(buffer, &chunk) {
            feeder.pending = Some(chunk);
            return Err(e);
        }
        feeder.idle.pop_front();
        feeder.loaded.push(buffer);
    }
    Ok(())
}

/// Start the source, or restart it after it stopped on its own, while the
/// player wants it playing. Skipped while paused or with nothing queued.
fn recover(ctx: &StreamContext, queued: bool) -> DeviceResult<()> {
    let state = ctx.shared.state.lock();
    if !queued || !is_running(ctx) || *state != TransportState::Playing {
        return Ok(());
    }
    if ctx.sink.state()? != SourceState::Playing {
        debug!("Source not playing, starting it");
        ctx.sink.play()?;
    }
    Ok(())
}
