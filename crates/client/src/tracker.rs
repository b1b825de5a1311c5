//! Per-job tracker: observe one job end-to-end and act exactly once when
//! it reaches a terminal state.
//!
//! [`JobTracker::spawn`] subscribes through the shared [`JobChannel`],
//! merges updates into a [`JobSnapshot`] published on a
//! [`Store`], and dispatches to a [`JobObserver`]. A [`TerminalGuard`]
//! makes the terminal callback idempotent when the server redelivers.

use std::sync::Arc;

use serde_json::json;
use tellmemo_core::job::{ApplyOutcome, JobSnapshot, JobStatus, JobUpdate};
use tellmemo_core::types::JobId;
use tellmemo_events::bus::{EVENT_JOB_CANCELLED, EVENT_JOB_COMPLETED, EVENT_JOB_FAILED};
use tellmemo_events::{ClientEvent, EventBus, Notification, NotificationCenter, Resource, Store};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelError, JobChannel};
use crate::events::ChannelEvent;

/// Message used when a job fails without an error message.
pub const UNKNOWN_FAILURE_MESSAGE: &str = "Job failed without an error message";

// ---------------------------------------------------------------------------
// TerminalGuard
// ---------------------------------------------------------------------------

/// The single action a tracker takes when its job finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    /// `result_id` is the configured result field, if the payload had it.
    Completed { result_id: Option<String> },
    Failed { error: String },
    Cancelled,
}

/// One-shot latch over terminal updates.
///
/// The first terminal update yields an outcome; every later one (a
/// duplicate `completed`, or a conflicting status) yields `None`.
#[derive(Debug, Clone)]
pub struct TerminalGuard {
    result_key: Option<String>,
    acted: bool,
}

impl TerminalGuard {
    /// `result_key` names the result field to extract on completion,
    /// e.g. `"summary_id"`.
    pub fn new(result_key: Option<String>) -> Self {
        Self {
            result_key,
            acted: false,
        }
    }

    pub fn observe(&mut self, update: &JobUpdate) -> Option<TerminalOutcome> {
        if self.acted || !update.status.is_terminal() {
            return None;
        }
        self.acted = true;

        let outcome = match update.status {
            JobStatus::Completed => TerminalOutcome::Completed {
                result_id: self
                    .result_key
                    .as_deref()
                    .and_then(|key| update.result_field(key)),
            },
            JobStatus::Failed => TerminalOutcome::Failed {
                error: update
                    .error_message
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_FAILURE_MESSAGE.to_string()),
            },
            _ => TerminalOutcome::Cancelled,
        };
        Some(outcome)
    }

    pub fn has_acted(&self) -> bool {
        self.acted
    }
}

// ---------------------------------------------------------------------------
// JobObserver
// ---------------------------------------------------------------------------

/// Callbacks driven by a [`JobTracker`]. All methods default to no-ops.
pub trait JobObserver: Send + 'static {
    /// A non-terminal update was merged.
    fn on_progress(&mut self, _snapshot: &JobSnapshot) {}

    fn on_completed(&mut self, _snapshot: &JobSnapshot, _result_id: Option<&str>) {}

    fn on_failed(&mut self, _snapshot: &JobSnapshot, _error: &str) {}

    fn on_cancelled(&mut self, _snapshot: &JobSnapshot) {}

    /// Subscribing failed. The tracker retries on the next reconnect.
    fn on_connection_error(&mut self, _error: &ChannelError) {}
}

// ---------------------------------------------------------------------------
// JobTracker
// ---------------------------------------------------------------------------

/// Handle to a running tracker task.
///
/// Dropping it (or calling [`dispose`](Self::dispose)) stops the task,
/// which releases its channel subscription.
pub struct JobTracker {
    job_id: JobId,
    channel: JobChannel,
    store: Arc<Store<JobSnapshot>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Option<TerminalOutcome>>>,
}

impl JobTracker {
    pub fn spawn<O: JobObserver>(
        channel: &JobChannel,
        job_id: impl Into<JobId>,
        result_key: Option<String>,
        observer: O,
    ) -> Self {
        let job_id = job_id.into();
        let store = Arc::new(Store::new());
        let cancel = channel.child_token();

        let handle = tokio::spawn(run_tracker(
            channel.clone(),
            job_id.clone(),
            TerminalGuard::new(result_key),
            observer,
            Arc::clone(&store),
            cancel.clone(),
        ));

        Self {
            job_id,
            channel: channel.clone(),
            store,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// `Loading` until the first update arrives, including while
    /// subscribing is being retried, then the merged snapshot. `Error` only
    /// if the channel was shut down or the job id is empty.
    pub fn state(&self) -> watch::Receiver<Resource<JobSnapshot>> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> Option<JobSnapshot> {
        self.store.get().data().cloned()
    }

    /// Ask the server to cancel the tracked job.
    pub fn cancel_job(&self) -> Result<(), ChannelError> {
        self.channel.cancel_job(&self.job_id)
    }

    /// Wait for the tracker to stop. Returns the terminal outcome, or
    /// `None` if it was disposed, the channel shut down first, or the
    /// outcome was already collected.
    pub async fn finished(&mut self) -> Option<TerminalOutcome> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, "Job tracker task failed");
                None
            }
        }
    }

    /// Stop tracking. Safe to call more than once and after the channel
    /// has shut down.
    pub fn dispose(&mut self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(job_id = %self.job_id, "Disposing job tracker");
            self.cancel.cancel();
        }
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_tracker<O: JobObserver>(
    channel: JobChannel,
    job_id: JobId,
    mut guard: TerminalGuard,
    mut observer: O,
    store: Arc<Store<JobSnapshot>>,
    cancel: CancellationToken,
) -> Option<TerminalOutcome> {
    let mut lifecycle = channel.lifecycle();

    let mut subscription = loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return None,
            attempt = channel.watch_job(&job_id) => attempt,
        };

        match attempt {
            Ok(subscription) => break subscription,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to subscribe to job");
                observer.on_connection_error(&e);

                if matches!(e, ChannelError::Closed | ChannelError::InvalidJobId) {
                    store.set_error(e.to_string());
                    return None;
                }
                if !wait_for_connected(&mut lifecycle, &cancel).await {
                    return None;
                }
            }
        }
    };

    loop {
        let update = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Job tracker stopped before terminal state");
                return None;
            }
            update = subscription.next() => match update {
                Some(update) => update,
                None => return None,
            },
        };

        if let Some(outcome) = handle_update(&update, &mut guard, &mut observer, &store) {
            return Some(outcome);
        }
    }
}

/// Block until the channel reports a new session. Returns `false` if
/// cancelled first.
async fn wait_for_connected(
    lifecycle: &mut broadcast::Receiver<ChannelEvent>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            event = lifecycle.recv() => match event {
                Ok(ChannelEvent::Connected) => return true,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return false,
            },
        }
    }
}

/// Merge one update and dispatch to the observer. Returns the outcome
/// when this update triggered the terminal action.
fn handle_update<O: JobObserver>(
    update: &JobUpdate,
    guard: &mut TerminalGuard,
    observer: &mut O,
    store: &Store<JobSnapshot>,
) -> Option<TerminalOutcome> {
    let mut applied = ApplyOutcome::Applied;
    store.update(|resource| match resource {
        Resource::Data(snapshot) => applied = snapshot.apply(update),
        other => *other = Resource::Data(JobSnapshot::from(update)),
    });

    if applied == ApplyOutcome::Stale {
        tracing::debug!(
            job_id = %update.job_id,
            status = %update.status,
            "Ignoring out-of-order job update",
        );
    }

    let snapshot = match store.get() {
        Resource::Data(snapshot) => snapshot,
        _ => JobSnapshot::from(update),
    };

    let Some(outcome) = guard.observe(update) else {
        if applied == ApplyOutcome::Applied && !update.status.is_terminal() {
            observer.on_progress(&snapshot);
        }
        return None;
    };

    match &outcome {
        TerminalOutcome::Completed { result_id } => {
            tracing::info!(job_id = %update.job_id, result_id = ?result_id, "Job completed");
            observer.on_completed(&snapshot, result_id.as_deref());
        }
        TerminalOutcome::Failed { error } => {
            tracing::warn!(job_id = %update.job_id, error = %error, "Job failed");
            observer.on_failed(&snapshot, error);
        }
        TerminalOutcome::Cancelled => {
            tracing::info!(job_id = %update.job_id, "Job cancelled");
            observer.on_cancelled(&snapshot);
        }
    }
    Some(outcome)
}

// ---------------------------------------------------------------------------
// Event bus bridge
// ---------------------------------------------------------------------------

/// Observer that publishes job outcomes on an [`EventBus`] and records
/// them in a [`NotificationCenter`].
pub struct NotifyingObserver {
    bus: Arc<EventBus>,
    notifications: Arc<NotificationCenter>,
}

impl NotifyingObserver {
    pub fn new(bus: Arc<EventBus>, notifications: Arc<NotificationCenter>) -> Self {
        Self { bus, notifications }
    }
}

impl JobObserver for NotifyingObserver {
    fn on_completed(&mut self, snapshot: &JobSnapshot, result_id: Option<&str>) {
        self.bus.publish(
            ClientEvent::new(EVENT_JOB_COMPLETED)
                .with_job(snapshot.job_id.clone())
                .with_payload(json!({ "result_id": result_id })),
        );
        if let Some(n) = Notification::from_job_outcome(
            &snapshot.job_id,
            JobStatus::Completed,
            result_id.map(str::to_string),
            None,
        ) {
            self.notifications.push(n);
        }
    }

    fn on_failed(&mut self, snapshot: &JobSnapshot, error: &str) {
        self.bus.publish(
            ClientEvent::new(EVENT_JOB_FAILED)
                .with_job(snapshot.job_id.clone())
                .with_payload(json!({ "error": error })),
        );
        if let Some(n) =
            Notification::from_job_outcome(&snapshot.job_id, JobStatus::Failed, None, Some(error))
        {
            self.notifications.push(n);
        }
    }

    fn on_cancelled(&mut self, snapshot: &JobSnapshot) {
        self.bus
            .publish(ClientEvent::new(EVENT_JOB_CANCELLED).with_job(snapshot.job_id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Default)]
    struct Recorder {
        progress: Vec<f64>,
        completed: Vec<Option<String>>,
        failed: Vec<String>,
        cancelled: usize,
    }

    impl JobObserver for Recorder {
        fn on_progress(&mut self, snapshot: &JobSnapshot) {
            self.progress.push(snapshot.progress);
        }
        fn on_completed(&mut self, _snapshot: &JobSnapshot, result_id: Option<&str>) {
            self.completed.push(result_id.map(str::to_string));
        }
        fn on_failed(&mut self, _snapshot: &JobSnapshot, error: &str) {
            self.failed.push(error.to_string());
        }
        fn on_cancelled(&mut self, _snapshot: &JobSnapshot) {
            self.cancelled += 1;
        }
    }

    fn completed(job_id: &str) -> JobUpdate {
        JobUpdate::new(job_id, JobStatus::Completed)
            .with_progress(100.0)
            .with_result(json!({"summary_id": "s-9"}))
    }

    // -- TerminalGuard --------------------------------------------------------

    #[test]
    fn duplicate_completed_acts_once() {
        let mut guard = TerminalGuard::new(Some("summary_id".into()));
        assert_eq!(
            guard.observe(&completed("j-1")),
            Some(TerminalOutcome::Completed {
                result_id: Some("s-9".into())
            })
        );
        assert!(guard.has_acted());
        assert_eq!(guard.observe(&completed("j-1")), None);
    }

    #[test]
    fn duplicate_failed_acts_once() {
        let mut guard = TerminalGuard::new(None);
        let failed = JobUpdate::new("j-1", JobStatus::Failed).with_error("LLM timeout");
        assert_eq!(
            guard.observe(&failed),
            Some(TerminalOutcome::Failed {
                error: "LLM timeout".into()
            })
        );
        assert_eq!(guard.observe(&failed), None);
        assert_eq!(guard.observe(&completed("j-1")), None);
    }

    #[test]
    fn non_terminal_updates_do_not_trip_guard() {
        let mut guard = TerminalGuard::new(None);
        assert_eq!(guard.observe(&JobUpdate::new("j-1", JobStatus::Processing)), None);
        assert!(!guard.has_acted());
    }

    #[test]
    fn missing_result_field_and_error_message() {
        let mut guard = TerminalGuard::new(Some("summary_id".into()));
        assert_eq!(
            guard.observe(&JobUpdate::new("j-1", JobStatus::Completed)),
            Some(TerminalOutcome::Completed { result_id: None })
        );

        let mut guard = TerminalGuard::new(None);
        assert_matches!(
            guard.observe(&JobUpdate::new("j-2", JobStatus::Failed)),
            Some(TerminalOutcome::Failed { error }) if error == UNKNOWN_FAILURE_MESSAGE
        );
    }

    #[test]
    fn cancelled_outcome() {
        let mut guard = TerminalGuard::new(None);
        assert_eq!(
            guard.observe(&JobUpdate::new("j-1", JobStatus::Cancelled)),
            Some(TerminalOutcome::Cancelled)
        );
    }

    // -- handle_update --------------------------------------------------------

    #[test]
    fn handle_update_dispatches_progress_then_single_completion() {
        let store = Store::new();
        let mut guard = TerminalGuard::new(Some("summary_id".into()));
        let mut observer = Recorder::default();

        let step = JobUpdate::new("j-1", JobStatus::Processing).with_progress(40.0);
        assert!(handle_update(&step, &mut guard, &mut observer, &store).is_none());

        let done = completed("j-1");
        assert!(handle_update(&done, &mut guard, &mut observer, &store).is_some());
        assert!(handle_update(&done, &mut guard, &mut observer, &store).is_none());

        assert_eq!(observer.progress, vec![40.0]);
        assert_eq!(observer.completed, vec![Some("s-9".to_string())]);
        assert_eq!(store.get().data().map(|s| s.status), Some(JobStatus::Completed));
    }

    #[test]
    fn stale_progress_is_not_reported() {
        let store = Store::new();
        let mut guard = TerminalGuard::new(None);
        let mut observer = Recorder::default();

        let failed = JobUpdate::new("j-1", JobStatus::Failed).with_error("boom");
        handle_update(&failed, &mut guard, &mut observer, &store);
        let late = JobUpdate::new("j-1", JobStatus::Processing).with_progress(90.0);
        handle_update(&late, &mut guard, &mut observer, &store);

        assert!(observer.progress.is_empty());
        assert_eq!(observer.failed, vec!["boom".to_string()]);
        assert_eq!(observer.cancelled, 0);
        assert_eq!(store.get().data().map(|s| s.status), Some(JobStatus::Failed));
    }

    // -- NotifyingObserver ----------------------------------------------------

    #[tokio::test]
    async fn notifying_observer_publishes_and_records() {
        let bus = Arc::new(EventBus::default());
        let center = Arc::new(NotificationCenter::default());
        let mut rx = bus.subscribe();
        let mut observer = NotifyingObserver::new(Arc::clone(&bus), Arc::clone(&center));

        let snapshot = JobSnapshot::from(&completed("j-1"));
        observer.on_completed(&snapshot, Some("s-9"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_JOB_COMPLETED);
        assert_eq!(event.payload["result_id"], "s-9");
        assert_eq!(center.unread_count(), 1);

        observer.on_cancelled(&snapshot);
        assert_eq!(rx.recv().await.unwrap().event_type, EVENT_JOB_CANCELLED);
        assert_eq!(center.len(), 1);
    }
}
