/// Server-assigned job identifiers are opaque strings (UUIDs in practice).
pub type JobId = String;

/// Organization, project, task, and summary identifiers.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
