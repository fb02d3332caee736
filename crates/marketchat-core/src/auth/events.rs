use tokio::sync::broadcast;
use tracing::debug;

/// Buffer for session events; subscribers that lag past this lose the oldest.
const EVENT_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The long-lived session could not produce a new credential
    RefreshFailed,
    LoggedOut,
    AccountDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is gone; the host should route to its login entry point.
    Terminated(TerminationReason),
}

/// Fan-out of session events to whatever host UI is listening.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn terminated(&self, reason: TerminationReason) {
        // No subscribers is fine; nobody needs to be routed anywhere.
        if self.tx.send(SessionEvent::Terminated(reason)).is_err() {
            debug!(?reason, "Session terminated with no event subscribers");
        }
    }
}
