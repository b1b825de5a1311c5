//! Job channel wire messages.
//!
//! The client sends JSON commands tagged by `action`:
//! `{"action": "subscribe", "job_id": "..."}`. The server replies with
//! messages shaped `{"type": "<kind>", "data": {...}}`, deserialized into
//! [`ServerMessage`].

use serde::{Deserialize, Serialize};
use tellmemo_core::job::JobUpdate;
use tellmemo_core::types::JobId;

/// Commands sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start receiving updates for a job.
    Subscribe { job_id: JobId },
    /// Stop receiving updates for a job.
    Unsubscribe { job_id: JobId },
    /// Ask the server to abort a job. Best effort.
    Cancel { job_id: JobId },
    /// Application-level heartbeat.
    Ping,
}

impl ClientCommand {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ClientCommand is always serialisable")
    }
}

/// All known server-to-client message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Status change or progress for a subscribed job.
    JobUpdate(JobUpdate),
    /// Acknowledges a `subscribe` command.
    Subscribed(JobRef),
    /// Acknowledges an `unsubscribe` command.
    Unsubscribed(JobRef),
    /// Reply to `ping`.
    Pong,
    /// The server rejected a command.
    Error(ErrorData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub job_id: JobId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    #[serde(default)]
    pub job_id: Option<JobId>,
}

/// Parse a server text frame.
///
/// Returns `Err` for malformed JSON or unknown `type` values; callers
/// log and continue.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
