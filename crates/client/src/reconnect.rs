//! Backoff schedule and retry loop used after the job channel drops.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{JobSocket, JobSocketClient};
use crate::events::StatusReporter;

/// Retry schedule: `initial_delay`, then multiplied by `multiplier` after
/// each failure, never above `max_delay`.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Infinite sequence of delays, one per reconnect attempt.
    pub fn delays(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            next: self.initial_delay.min(self.max_delay),
        }
    }

    /// Delay that follows `current` in the schedule.
    pub fn grow(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max_delay)
    }
}

/// Iterator returned by [`ReconnectConfig::delays`].
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    config: &'a ReconnectConfig,
    next: Duration,
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = self.config.grow(current);
        Some(current)
    }
}

/// Retry `client.connect()` on the backoff schedule, sleeping before every
/// attempt. `None` means `cancel` fired first.
pub(crate) async fn reconnect_loop(
    client: &JobSocketClient,
    config: &ReconnectConfig,
    reporter: &StatusReporter,
    cancel: &CancellationToken,
) -> Option<JobSocket> {
    for (attempt, delay) in (1u32..).zip(config.delays()) {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(ws_url = %client.ws_url(), attempt, "Reconnect abandoned");
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        reporter.reconnecting(attempt);
        tracing::info!(
            ws_url = %client.ws_url(),
            attempt,
            waited_ms = delay.as_millis() as u64,
            "Reconnecting to job channel",
        );

        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = client.connect() => result,
        };

        match result {
            Ok(socket) => {
                tracing::info!(ws_url = %client.ws_url(), attempt, "Job channel restored");
                return Some(socket);
            }
            Err(e) => {
                tracing::warn!(ws_url = %client.ws_url(), attempt, error = %e, "Reconnect failed");
                reporter.failed(attempt, e.to_string());
            }
        }
    }
    None
}
