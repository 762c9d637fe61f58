//! Connection state shared by the IRC and Discord sessions.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Which backend a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Irc,
    Discord,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Irc => f.write_str("IRC"),
            Self::Discord => f.write_str("Discord"),
        }
    }
}

/// Lifecycle of one backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    /// Waiting out the given backoff before connecting again.
    Reconnecting(Duration),
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Ready => f.write_str("ready"),
            Self::Reconnecting(delay) => {
                write!(f, "reconnecting in {:.1}s", delay.as_secs_f64())
            }
        }
    }
}

/// Publishes state transitions of one backend.
///
/// Only the owning session holds a `StateTracker`. The router learns about
/// transitions from the events the session emits alongside.
#[derive(Debug)]
pub struct StateTracker {
    backend: Backend,
    tx: watch::Sender<ConnectionState>,
}

impl StateTracker {
    pub fn new(backend: Backend) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { backend, tx }
    }

    /// Record a transition. Repeated identical states are not re-published.
    pub fn set(&self, state: ConnectionState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(backend = %self.backend, state = %state, "Connection state changed");
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_publishes_changes() {
        let tracker = StateTracker::new(Backend::Irc);
        let mut rx = tracker.subscribe();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);

        tracker.set(ConnectionState::Connecting);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

        tracker.set(ConnectionState::Connecting);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert_eq!(
            ConnectionState::Reconnecting(Duration::from_millis(1500)).to_string(),
            "reconnecting in 1.5s"
        );
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Authenticating.is_ready());
    }
}
