//! Client-wide fan-out of [`ClientEvent`]s over `tokio::sync::broadcast`.
//!
//! [`EventBus`] carries [`ClientEvent`]s between independent parts of the
//! client (job trackers, the bulk-invite sender, the session layer) and
//! whoever renders them. Share it via `Arc<EventBus>`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tellmemo_core::types::{JobId, Timestamp};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const EVENT_JOB_COMPLETED: &str = "job.completed";
pub const EVENT_JOB_FAILED: &str = "job.failed";
pub const EVENT_JOB_CANCELLED: &str = "job.cancelled";
pub const EVENT_INVITES_SENT: &str = "invites.sent";
pub const EVENT_SESSION_EXPIRED: &str = "session.expired";

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// Something that happened inside the client that other parts may react to.
///
/// Constructed via [`ClientEvent::new`] and enriched with
/// [`with_job`](ClientEvent::with_job) and
/// [`with_payload`](ClientEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Dot-separated event name, e.g. `"job.completed"`.
    pub event_type: String,

    /// The job this event concerns, if any.
    pub job_id: Option<JobId>,

    /// Event-specific fields; an empty object when there are none.
    pub payload: serde_json::Value,

    pub timestamp: Timestamp,
}

impl ClientEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_job(mut self, job_id: impl Into<JobId>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per receiver before it starts lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Publish/subscribe hub shared as `Arc<EventBus>`.
///
/// ```rust
/// use tellmemo_events::bus::{ClientEvent, EventBus, EVENT_JOB_COMPLETED};
///
/// let bus = EventBus::default();
/// let _rx = bus.subscribe();
/// assert_eq!(bus.publish(ClientEvent::new(EVENT_JOB_COMPLETED).with_job("job-1")), 1);
/// ```
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Receivers that fall `capacity` events behind get `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// Deliver `event` to current subscribers and return how many there
    /// were. Zero subscribers is not an error.
    pub fn publish(&self, event: ClientEvent) -> usize {
        tracing::trace!(event_type = %event.event_type, job_id = ?event.job_id, "Client event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
