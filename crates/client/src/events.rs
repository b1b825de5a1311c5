//! Connection lifecycle events and state for the job channel.

use tokio::sync::{broadcast, watch};

/// Lifecycle transitions broadcast by the channel.
///
/// Trackers listen for [`ChannelEvent::Connected`] to retry a subscription
/// that failed while the server was unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A session was established. Active subscriptions have been queued
    /// for replay.
    Connected,
    /// The live session ended.
    Disconnected,
    /// A reconnection attempt is about to start.
    Reconnecting { attempt: u32 },
}

/// Current state of the channel's connection task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection task has been started.
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Waiting between attempts. `last_error` is set once an attempt failed.
    Reconnecting {
        attempt: u32,
        last_error: Option<String>,
    },
    /// Shut down; the channel will not reconnect.
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Publishes state changes and lifecycle events together.
#[derive(Debug, Clone)]
pub(crate) struct StatusReporter {
    state_tx: watch::Sender<ConnectionState>,
    lifecycle_tx: broadcast::Sender<ChannelEvent>,
}

impl StatusReporter {
    pub(crate) fn new(
        state_tx: watch::Sender<ConnectionState>,
        lifecycle_tx: broadcast::Sender<ChannelEvent>,
    ) -> Self {
        Self {
            state_tx,
            lifecycle_tx,
        }
    }

    pub(crate) fn connecting(&self) {
        self.state_tx.send_replace(ConnectionState::Connecting);
    }

    pub(crate) fn connected(&self) {
        self.state_tx.send_replace(ConnectionState::Connected);
        let _ = self.lifecycle_tx.send(ChannelEvent::Connected);
    }

    pub(crate) fn disconnected(&self) {
        self.state_tx.send_replace(ConnectionState::Reconnecting {
            attempt: 0,
            last_error: None,
        });
        let _ = self.lifecycle_tx.send(ChannelEvent::Disconnected);
    }

    pub(crate) fn reconnecting(&self, attempt: u32) {
        self.state_tx.send_modify(|state| {
            let last_error = match state {
                ConnectionState::Reconnecting { last_error, .. } => last_error.take(),
                _ => None,
            };
            *state = ConnectionState::Reconnecting {
                attempt,
                last_error,
            };
        });
        let _ = self.lifecycle_tx.send(ChannelEvent::Reconnecting { attempt });
    }

    pub(crate) fn failed(&self, attempt: u32, error: String) {
        self.state_tx.send_replace(ConnectionState::Reconnecting {
            attempt,
            last_error: Some(error),
        });
    }

    pub(crate) fn closed(&self) {
        self.state_tx.send_replace(ConnectionState::Closed);
    }

    pub(crate) fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn lifecycle(&self) -> broadcast::Receiver<ChannelEvent> {
        self.lifecycle_tx.subscribe()
    }

    pub(crate) fn current(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> StatusReporter {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (lifecycle_tx, _) = broadcast::channel(8);
        StatusReporter::new(state_tx, lifecycle_tx)
    }

    #[tokio::test]
    async fn connected_updates_state_and_broadcasts() {
        let reporter = reporter();
        let mut events = reporter.lifecycle();
        reporter.connected();
        assert!(reporter.current().is_connected());
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
    }

    #[test]
    fn reconnecting_keeps_last_error() {
        let reporter = reporter();
        reporter.failed(1, "refused".into());
        reporter.reconnecting(2);
        assert_eq!(
            reporter.current(),
            ConnectionState::Reconnecting {
                attempt: 2,
                last_error: Some("refused".into()),
            }
        );
    }

    #[test]
    fn state_defaults_to_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }
}
