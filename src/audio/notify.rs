// Completion notification for tracks that play through to the end

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use super::player::SessionId;

/// Told once per session when a track finishes on its own.
///
/// Never called for sessions ended by `stop`.
pub trait CompletionNotifier: Send + Sync {
    fn track_finished(&self, session: SessionId);
}

impl<F> CompletionNotifier for F
where
    F: Fn(SessionId) + Send + Sync,
{
    fn track_finished(&self, session: SessionId) {
        self(session)
    }
}

/// Forwards completions into a channel, for callers that block on them.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<SessionId>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<SessionId>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl CompletionNotifier for ChannelNotifier {
    fn track_finished(&self, session: SessionId) {
        if self.tx.send(session).is_err() {
            debug!(%session, "Completion receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_notifier_forwards() {
        let (notifier, rx) = ChannelNotifier::new();
        notifier.track_finished(SessionId(3));
        assert_eq!(rx.try_recv().unwrap(), SessionId(3));
    }

    #[test]
    fn test_closure_notifier() {
        let seen = std::sync::Mutex::new(Vec::new());
        let notifier = |s: SessionId| seen.lock().unwrap().push(s);
        notifier.track_finished(SessionId(1));
        assert_eq!(*seen.lock().unwrap(), vec![SessionId(1)]);
    }
}
