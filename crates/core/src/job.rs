//! Job status model for long-running backend operations.
//!
//! A job is created server-side when an operation such as summary
//! generation is enqueued, and the server pushes [`JobUpdate`]s as it
//! progresses. [`JobSnapshot`] is the client's merged view of one job and
//! is the only place where the lifecycle invariants are enforced:
//!
//! - status only moves toward a terminal state;
//! - progress never decreases while the job is processing;
//! - updates for other jobs are rejected.
//!
//! Delivery is treated as unordered and possibly duplicated, so stale
//! updates are reported back to the caller instead of being applied.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EntityId, JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status names
// ---------------------------------------------------------------------------

pub const JOB_STATUS_QUEUED: &str = "queued";
pub const JOB_STATUS_PROCESSING: &str = "processing";
pub const JOB_STATUS_COMPLETED: &str = "completed";
pub const JOB_STATUS_FAILED: &str = "failed";
pub const JOB_STATUS_CANCELLED: &str = "cancelled";

/// All valid job status names.
pub const VALID_JOB_STATUSES: &[&str] = &[
    JOB_STATUS_QUEUED,
    JOB_STATUS_PROCESSING,
    JOB_STATUS_COMPLETED,
    JOB_STATUS_FAILED,
    JOB_STATUS_CANCELLED,
];

/// Upper bound of the progress percentage.
pub const MAX_PROGRESS: f64 = 100.0;

/// Lifecycle status of a backend job.
///
/// The backend historically used `pending` and `running`; both are
/// accepted as aliases on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "pending")]
    Queued,
    #[serde(alias = "running")]
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => JOB_STATUS_QUEUED,
            Self::Processing => JOB_STATUS_PROCESSING,
            Self::Completed => JOB_STATUS_COMPLETED,
            Self::Failed => JOB_STATUS_FAILED,
            Self::Cancelled => JOB_STATUS_CANCELLED,
        }
    }

    /// Parse from a string, returning an error for unknown statuses.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            JOB_STATUS_QUEUED | "pending" => Ok(Self::Queued),
            JOB_STATUS_PROCESSING | "running" => Ok(Self::Processing),
            JOB_STATUS_COMPLETED => Ok(Self::Completed),
            JOB_STATUS_FAILED => Ok(Self::Failed),
            JOB_STATUS_CANCELLED => Ok(Self::Cancelled),
            other => Err(CoreError::unknown("job status", other, VALID_JOB_STATUSES)),
        }
    }

    /// Whether no further transition is expected from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    ///
    /// Nothing leaves a terminal status, including a repeat of the same
    /// terminal status. Non-terminal statuses may repeat.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// One status event pushed by the server for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Completion percentage (0-100). Out-of-range values are clamped on use.
    #[serde(default)]
    pub progress: f64,
    /// Human-readable description of the current step.
    #[serde(default)]
    pub step_description: Option<String>,
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub total_steps: Option<u32>,
    /// Result payload, e.g. `{"summary_id": "..."}` on completion.
    #[serde(default)]
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl JobUpdate {
    /// Create an update carrying only the job id and status.
    pub fn new(job_id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            progress: 0.0,
            step_description: None,
            current_step: None,
            total_steps: None,
            result: None,
            error_message: None,
            project_id: None,
            job_type: None,
            updated_at: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_step(mut self, current: u32, total: u32, description: impl Into<String>) -> Self {
        self.current_step = Some(current);
        self.total_steps = Some(total);
        self.step_description = Some(description.into());
        self
    }

    /// Set the result payload. Non-object values are ignored.
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = result {
            self.result = Some(map);
        }
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Progress clamped to `0..=100`; `NaN` reads as zero.
    pub fn clamped_progress(&self) -> f64 {
        clamp_progress(self.progress)
    }

    /// Read a scalar field from the result payload as a string.
    ///
    /// Strings are returned as-is and numbers are formatted; any other
    /// shape (including `null`) yields `None`.
    pub fn result_field(&self, key: &str) -> Option<String> {
        result_field(self.result.as_ref(), key)
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, MAX_PROGRESS)
    }
}

fn result_field(
    result: Option<&serde_json::Map<String, serde_json::Value>>,
    key: &str,
) -> Option<String> {
    match result?.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// JobSnapshot
// ---------------------------------------------------------------------------

/// Result of applying a [`JobUpdate`] to a [`JobSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The update was merged into the snapshot.
    Applied,
    /// The update would move the job backwards (or out of a terminal
    /// state) and was ignored.
    Stale,
    /// The update belongs to a different job.
    WrongJob,
}

/// Client-side merged view of a single job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub step_description: Option<String>,
    pub current_step: Option<u32>,
    pub total_steps: Option<u32>,
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    pub error_message: Option<String>,
    /// Number of updates merged so far.
    pub updates_applied: u32,
}

impl JobSnapshot {
    /// A freshly enqueued job with no progress.
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            step_description: None,
            current_step: None,
            total_steps: None,
            result: None,
            error_message: None,
            updates_applied: 0,
        }
    }

    /// Merge an update, enforcing the lifecycle invariants.
    pub fn apply(&mut self, update: &JobUpdate) -> ApplyOutcome {
        if update.job_id != self.job_id {
            return ApplyOutcome::WrongJob;
        }
        if !self.status.can_transition_to(update.status) {
            return ApplyOutcome::Stale;
        }

        let incoming = update.clamped_progress();
        self.progress = match update.status {
            JobStatus::Completed => MAX_PROGRESS,
            JobStatus::Processing if self.status == JobStatus::Processing => {
                self.progress.max(incoming)
            }
            _ => incoming.max(self.progress),
        };
        self.status = update.status;

        if update.step_description.is_some() {
            self.step_description = update.step_description.clone();
        }
        if update.current_step.is_some() {
            self.current_step = update.current_step;
        }
        if update.total_steps.is_some() {
            self.total_steps = update.total_steps;
        }
        if update.result.is_some() {
            self.result = update.result.clone();
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message.clone();
        }

        self.updates_applied += 1;
        ApplyOutcome::Applied
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// See [`JobUpdate::result_field`].
    pub fn result_field(&self, key: &str) -> Option<String> {
        result_field(self.result.as_ref(), key)
    }

    /// Label such as `"Step 2 of 5: Extracting action items"`.
    pub fn step_label(&self) -> Option<String> {
        match (self.current_step, self.total_steps, &self.step_description) {
            (Some(cur), Some(total), Some(desc)) => Some(format!("Step {cur} of {total}: {desc}")),
            (Some(cur), Some(total), None) => Some(format!("Step {cur} of {total}")),
            (_, _, Some(desc)) => Some(desc.clone()),
            _ => None,
        }
    }
}

impl From<&JobUpdate> for JobSnapshot {
    fn from(update: &JobUpdate) -> Self {
        let mut snapshot = JobSnapshot::new(update.job_id.clone());
        snapshot.apply(update);
        snapshot
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn processing(progress: f64) -> JobUpdate {
        JobUpdate::new("job-1", JobStatus::Processing).with_progress(progress)
    }

    // -- JobStatus -----------------------------------------------------------

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn no_transition_out_of_terminal() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn processing_cannot_return_to_queued() {
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn status_from_str_accepts_legacy_aliases() {
        assert_eq!(JobStatus::from_str("pending").unwrap(), JobStatus::Queued);
        assert_eq!(JobStatus::from_str("running").unwrap(), JobStatus::Processing);
        assert_matches!(
            JobStatus::from_str("exploded"),
            Err(CoreError::UnknownValue { kind: "job status", .. })
        );
    }

    #[test]
    fn status_deserializes_lowercase_and_aliases() {
        let s: JobStatus = serde_json::from_str(r#""completed""#).unwrap();
        assert_eq!(s, JobStatus::Completed);
        let s: JobStatus = serde_json::from_str(r#""running""#).unwrap();
        assert_eq!(s, JobStatus::Processing);
    }

    // -- JobUpdate -----------------------------------------------------------

    #[test]
    fn update_deserializes_with_missing_optionals() {
        let json = r#"{"job_id":"abc","status":"queued"}"#;
        let update: JobUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.job_id, "abc");
        assert_eq!(update.progress, 0.0);
        assert!(update.result.is_none());
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(processing(150.0).clamped_progress(), 100.0);
        assert_eq!(processing(-3.0).clamped_progress(), 0.0);
        assert_eq!(processing(f64::NAN).clamped_progress(), 0.0);
    }

    #[test]
    fn result_field_reads_strings_and_numbers() {
        let update = JobUpdate::new("job-1", JobStatus::Completed)
            .with_result(serde_json::json!({"summary_id": "s-9", "count": 3, "empty": "", "n": null}));
        assert_eq!(update.result_field("summary_id").as_deref(), Some("s-9"));
        assert_eq!(update.result_field("count").as_deref(), Some("3"));
        assert_eq!(update.result_field("empty"), None);
        assert_eq!(update.result_field("n"), None);
        assert_eq!(update.result_field("missing"), None);
    }

    // -- JobSnapshot ---------------------------------------------------------

    #[test]
    fn apply_rejects_other_jobs() {
        let mut snap = JobSnapshot::new("job-1");
        let other = JobUpdate::new("job-2", JobStatus::Processing);
        assert_eq!(snap.apply(&other), ApplyOutcome::WrongJob);
        assert_eq!(snap.updates_applied, 0);
    }

    #[test]
    fn progress_never_decreases_while_processing() {
        let mut snap = JobSnapshot::new("job-1");
        snap.apply(&processing(40.0));
        assert_eq!(snap.apply(&processing(25.0)), ApplyOutcome::Applied);
        assert_eq!(snap.progress, 40.0);
        snap.apply(&processing(60.0));
        assert_eq!(snap.progress, 60.0);
    }

    #[test]
    fn terminal_snapshot_ignores_later_updates() {
        let mut snap = JobSnapshot::new("job-1");
        snap.apply(&processing(50.0));
        snap.apply(&JobUpdate::new("job-1", JobStatus::Completed));
        assert_eq!(snap.progress, 100.0);

        assert_eq!(snap.apply(&processing(70.0)), ApplyOutcome::Stale);
        assert_eq!(
            snap.apply(&JobUpdate::new("job-1", JobStatus::Completed)),
            ApplyOutcome::Stale
        );
        assert_eq!(snap.status, JobStatus::Completed);
    }

    #[test]
    fn step_fields_are_kept_when_update_omits_them() {
        let mut snap = JobSnapshot::new("job-1");
        snap.apply(&processing(10.0).with_step(1, 4, "Loading transcripts"));
        snap.apply(&processing(30.0));
        assert_eq!(snap.current_step, Some(1));
        assert_eq!(
            snap.step_label().as_deref(),
            Some("Step 1 of 4: Loading transcripts")
        );
    }

    #[test]
    fn failure_keeps_error_message() {
        let mut snap = JobSnapshot::new("job-1");
        snap.apply(&JobUpdate::new("job-1", JobStatus::Failed).with_error("LLM timeout"));
        assert!(snap.is_terminal());
        assert_eq!(snap.error_message.as_deref(), Some("LLM timeout"));
    }
}
