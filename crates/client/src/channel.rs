//! Process-wide job-status channel.
//!
//! [`JobChannel`] owns one WebSocket connection task (connect -> session ->
//! reconnect loop) and a reference-counted registry of job subscriptions.
//! Every job update received is fanned out on a broadcast channel;
//! [`JobChannel::watch_job`] and [`JobChannel::job_updates`] narrow that
//! to a single job.
//!
//! The handle is cheap to clone. Call [`JobChannel::shutdown`] to stop the
//! connection task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tellmemo_core::job::JobUpdate;
use tellmemo_core::types::JobId;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::{JobSocket, JobSocketClient};
use crate::events::{ChannelEvent, ConnectionState, StatusReporter};
use crate::messages::ClientCommand;
use crate::processor::{run_session, SessionEnd};
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Broadcast channel capacity for job updates.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

const LIFECYCLE_CHANNEL_CAPACITY: usize = 32;

/// How long [`JobChannel::shutdown`] waits for the connection task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket base URL; `/ws/jobs` is appended.
    pub ws_url: String,
    pub token: Option<String>,
    /// How long [`JobChannel::connect`] waits for the first session.
    pub connect_timeout: Duration,
    /// Time between `ping` frames. `Duration::ZERO` disables them.
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl ChannelConfig {
    pub fn new(ws_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            token,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// JobChannel
// ---------------------------------------------------------------------------

/// Shared handle to the job-status channel.
#[derive(Clone)]
pub struct JobChannel {
    inner: Arc<Inner>,
}

struct Inner {
    client: JobSocketClient,
    config: ChannelConfig,
    /// Active subscriptions and their reference counts. Lock before
    /// `outbound` when both are needed.
    subscriptions: Mutex<HashMap<JobId, usize>>,
    /// Command queue of the live session, if any.
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientCommand>>>,
    update_tx: broadcast::Sender<JobUpdate>,
    reporter: StatusReporter,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl JobChannel {
    /// Create a channel. No I/O happens until the first
    /// [`connect`](Self::connect) or subscription.
    pub fn new(config: ChannelConfig) -> Self {
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                client: JobSocketClient::new(config.ws_url.clone(), config.token.clone()),
                config,
                subscriptions: Mutex::new(HashMap::new()),
                outbound: Mutex::new(None),
                update_tx,
                reporter: StatusReporter::new(state_tx, lifecycle_tx),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Start the connection task if needed and wait for a live session.
    ///
    /// Fails with [`ChannelError::Connection`] when the socket cannot be
    /// established within `connect_timeout`. The task keeps retrying in
    /// the background either way.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        self.ensure_task()?;

        let mut state = self.inner.reporter.state();
        let wait = async {
            loop {
                let current = state.borrow_and_update().clone();
                match current {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Closed => return Err(ChannelError::Closed),
                    ConnectionState::Reconnecting {
                        last_error: Some(e),
                        ..
                    } => return Err(ChannelError::Connection(e)),
                    _ => {}
                }
                if state.changed().await.is_err() {
                    return Err(ChannelError::Closed);
                }
            }
        };

        let timeout = self.inner.config.connect_timeout;
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Connection(format!(
                "timed out after {}s waiting for job channel",
                timeout.as_secs()
            ))),
        }
    }

    /// Subscribe to updates for `job_id`.
    ///
    /// Subscriptions are reference counted: a `subscribe` frame is sent
    /// only when the first reference is taken.
    pub async fn subscribe_to_job(&self, job_id: &str) -> Result<(), ChannelError> {
        if job_id.trim().is_empty() {
            return Err(ChannelError::InvalidJobId);
        }
        self.connect().await?;

        let mut subscriptions = lock(&self.inner.subscriptions);
        let count = subscriptions.entry(job_id.to_string()).or_insert(0);
        *count += 1;

        if *count == 1 {
            let command = ClientCommand::Subscribe {
                job_id: job_id.to_string(),
            };
            if !self.inner.send(command) {
                tracing::debug!(job_id, "Session dropped; subscription will be replayed");
            }
            tracing::info!(job_id, "Subscribed to job updates");
        } else {
            tracing::debug!(job_id, refs = *count, "Job already subscribed");
        }
        Ok(())
    }

    /// Release one reference to `job_id`, sending `unsubscribe` when the
    /// last one goes. Unknown ids are ignored.
    pub fn unsubscribe_from_job(&self, job_id: &str) {
        let mut subscriptions = lock(&self.inner.subscriptions);

        let remaining = match subscriptions.get_mut(job_id) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => {
                tracing::debug!(job_id, "Unsubscribe for job without subscription ignored");
                return;
            }
        };

        if remaining > 0 {
            tracing::debug!(job_id, refs = remaining, "Released job subscription reference");
            return;
        }

        subscriptions.remove(job_id);
        let command = ClientCommand::Unsubscribe {
            job_id: job_id.to_string(),
        };
        if !self.inner.send(command) {
            tracing::debug!(job_id, "No live session for unsubscribe");
        }
        tracing::info!(job_id, "Unsubscribed from job updates");
    }

    /// Ask the server to cancel `job_id`. Best effort; the outcome
    /// arrives as a regular job update.
    pub fn cancel_job(&self, job_id: &str) -> Result<(), ChannelError> {
        if job_id.trim().is_empty() {
            return Err(ChannelError::InvalidJobId);
        }
        let command = ClientCommand::Cancel {
            job_id: job_id.to_string(),
        };
        if !self.inner.send(command) {
            return Err(ChannelError::NotConnected);
        }
        tracing::info!(job_id, "Requested job cancellation");
        Ok(())
    }

    /// Every job update the channel receives.
    pub fn updates(&self) -> broadcast::Receiver<JobUpdate> {
        self.inner.update_tx.subscribe()
    }

    /// Updates for a single job as a stream. Does not subscribe on the
    /// server; pair with [`subscribe_to_job`](Self::subscribe_to_job).
    pub fn job_updates(&self, job_id: impl Into<JobId>) -> impl Stream<Item = JobUpdate> + Send + 'static {
        let job_id = job_id.into();
        BroadcastStream::new(self.updates()).filter_map(move |item| match item {
            Ok(update) if update.job_id == job_id => Some(update),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(job_id = %job_id, skipped, "Job update stream lagged");
                None
            }
        })
    }

    /// Subscribe to `job_id` and return a handle that yields only its
    /// updates. Dropping the handle releases the subscription.
    pub async fn watch_job(&self, job_id: &str) -> Result<JobSubscription, ChannelError> {
        // Receiver first so no update between subscribe and return is lost.
        let rx = self.updates();
        self.subscribe_to_job(job_id).await?;
        Ok(JobSubscription {
            channel: self.clone(),
            job_id: job_id.to_string(),
            rx,
            active: true,
        })
    }

    pub fn lifecycle(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.reporter.lifecycle()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.reporter.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.reporter.current().is_connected()
    }

    /// Job ids with at least one active reference, sorted.
    pub fn active_subscriptions(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = lock(&self.inner.subscriptions).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn subscription_count(&self, job_id: &str) -> usize {
        lock(&self.inner.subscriptions).get(job_id).copied().unwrap_or(0)
    }

    /// Token cancelled when the channel shuts down.
    pub fn child_token(&self) -> CancellationToken {
        self.inner.cancel.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stop the connection task, waiting up to 5 seconds for it to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job channel");
        self.inner.cancel.cancel();

        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Job channel task did not exit in time");
            }
        }

        *lock(&self.inner.outbound) = None;
        self.inner.reporter.closed();
        tracing::info!("Job channel shut down complete");
    }

    // ---- private helpers ----

    fn ensure_task(&self) -> Result<(), ChannelError> {
        if self.inner.cancel.is_cancelled() {
            return Err(ChannelError::Closed);
        }

        let mut task = lock(&self.inner.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            tracing::info!(ws_url = %inner.config.ws_url, "Starting job channel task");
            run_connection_loop(&inner).await;
            tracing::info!("Job channel task exited");
        }));
        Ok(())
    }
}

impl Inner {
    /// Queue a command on the live session. Returns `false` if there is
    /// none.
    fn send(&self, command: ClientCommand) -> bool {
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }

    /// Install a fresh command queue and replay every active subscription
    /// into it.
    fn begin_session(&self) -> mpsc::UnboundedReceiver<ClientCommand> {
        let (tx, rx) = mpsc::unbounded_channel();

        let subscriptions = lock(&self.subscriptions);
        for job_id in subscriptions.keys() {
            let _ = tx.send(ClientCommand::Subscribe {
                job_id: job_id.clone(),
            });
        }
        if !subscriptions.is_empty() {
            tracing::info!(count = subscriptions.len(), "Replaying job subscriptions");
        }
        *lock(&self.outbound) = Some(tx);

        rx
    }

    fn end_session(&self) {
        *lock(&self.outbound) = None;
    }
}

/// Core connection loop: connect -> run session -> reconnect.
///
/// Runs until the channel's cancellation token is triggered.
async fn run_connection_loop(inner: &Inner) {
    let cancel = &inner.cancel;
    inner.reporter.connecting();

    let mut pending: Option<JobSocket> = tokio::select! {
        _ = cancel.cancelled() => None,
        result = inner.client.connect() => match result {
            Ok(socket) => Some(socket),
            Err(e) => {
                tracing::warn!(error = %e, "Connection failed, entering reconnect loop");
                inner.reporter.failed(0, e.to_string());
                None
            }
        },
    };

    loop {
        let socket = match pending.take() {
            Some(socket) => socket,
            None => match reconnect_loop(&inner.client, &inner.config.reconnect, &inner.reporter, cancel).await {
                Some(socket) => socket,
                None => break,
            },
        };

        let mut outbound_rx = inner.begin_session();
        inner.reporter.connected();

        let end = run_session(
            socket,
            &mut outbound_rx,
            &inner.update_tx,
            inner.config.heartbeat_interval,
            cancel,
        )
        .await;

        inner.end_session();
        inner.reporter.disconnected();

        if end == SessionEnd::Cancelled || cancel.is_cancelled() {
            break;
        }
        tracing::info!(?end, "Job channel session lost, entering reconnect loop");
    }

    inner.reporter.closed();
}

// ---------------------------------------------------------------------------
// JobSubscription
// ---------------------------------------------------------------------------

/// Updates for one subscribed job. Dropping it releases the subscription.
pub struct JobSubscription {
    channel: JobChannel,
    job_id: JobId,
    rx: broadcast::Receiver<JobUpdate>,
    active: bool,
}

impl JobSubscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the next update for this job. Returns `None` once the
    /// channel shuts down.
    pub async fn next(&mut self) -> Option<JobUpdate> {
        loop {
            let received = tokio::select! {
                _ = self.channel.inner.cancel.cancelled() => return None,
                received = self.rx.recv() => received,
            };
            match received {
                Ok(update) if update.job_id == self.job_id => return Some(update),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %self.job_id, skipped, "Job subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.channel.unsubscribe_from_job(&self.job_id);
        }
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`JobChannel`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The WebSocket could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The operation needs a live session and there is none.
    #[error("Job channel is not connected")]
    NotConnected,

    /// The channel was shut down.
    #[error("Job channel has been shut down")]
    Closed,

    #[error("Job id must not be empty")]
    InvalidJobId,
}
