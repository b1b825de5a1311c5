//! Session-scoped notification center.
//!
//! Entries are created when a server event arrives (an invitation was
//! accepted, a job finished) and mutated by mark-read / clear. Nothing is
//! persisted beyond the process.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tellmemo_core::job::JobStatus;
use tellmemo_core::types::{JobId, Timestamp};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default maximum number of retained notifications.
pub const DEFAULT_MAX_NOTIFICATIONS: usize = 100;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    InvitationAccepted,
    JobCompleted,
    JobFailed,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: Option<String>,
    pub read: bool,
    /// Display name of the user the entry is about (e.g. the invitee).
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub accepted_at: Option<Timestamp>,
    pub job_id: Option<JobId>,
    /// Resource produced by a job, e.g. a summary id.
    pub resource_id: Option<String>,
    pub created_at: Timestamp,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: None,
            read: false,
            user_name: None,
            user_email: None,
            accepted_at: None,
            job_id: None,
            resource_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// An invitee joined the organization.
    pub fn invitation_accepted(
        user_name: Option<String>,
        user_email: impl Into<String>,
        accepted_at: Timestamp,
    ) -> Self {
        let email = user_email.into();
        let who = user_name.clone().unwrap_or_else(|| email.clone());
        let mut n = Self::new(
            NotificationKind::InvitationAccepted,
            format!("{who} accepted your invitation"),
        );
        n.user_name = user_name;
        n.user_email = Some(email);
        n.accepted_at = Some(accepted_at);
        n
    }

    /// Build an entry for a finished job. Returns `None` for non-terminal
    /// statuses and for cancellations, which the user initiated.
    pub fn from_job_outcome(
        job_id: &str,
        status: JobStatus,
        resource_id: Option<String>,
        error: Option<&str>,
    ) -> Option<Self> {
        let mut n = match status {
            JobStatus::Completed => Self::new(NotificationKind::JobCompleted, "Job completed"),
            JobStatus::Failed => Self::new(NotificationKind::JobFailed, "Job failed")
                .with_message(error.unwrap_or("Unknown error")),
            _ => return None,
        };
        n.job_id = Some(job_id.to_string());
        n.resource_id = resource_id;
        Some(n)
    }
}

/// Change notifications emitted by [`NotificationCenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationChange {
    Added(Uuid),
    Read(Uuid),
    AllRead,
    Removed(Uuid),
    Cleared,
}

/// Bounded, newest-first list of notifications.
///
/// Methods are synchronous so they can be called from observer callbacks;
/// the internal lock is never held across an await point.
pub struct NotificationCenter {
    entries: Mutex<VecDeque<Notification>>,
    max_entries: usize,
    changes: broadcast::Sender<NotificationChange>,
}

impl NotificationCenter {
    pub fn new(max_entries: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, change: NotificationChange) {
        let _ = self.changes.send(change);
    }

    /// Add a notification at the front, dropping the oldest when full.
    pub fn push(&self, notification: Notification) -> Uuid {
        let id = notification.id;
        {
            let mut entries = self.lock();
            entries.push_front(notification);
            while entries.len() > self.max_entries {
                if let Some(dropped) = entries.pop_back() {
                    tracing::debug!(id = %dropped.id, "Dropping oldest notification");
                }
            }
        }
        self.emit(NotificationChange::Added(id));
        id
    }

    /// Mark one entry as read. Returns `false` if it does not exist or was
    /// already read.
    pub fn mark_read(&self, id: Uuid) -> bool {
        let changed = {
            let mut entries = self.lock();
            match entries.iter_mut().find(|n| n.id == id) {
                Some(n) if !n.read => {
                    n.read = true;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(NotificationChange::Read(id));
        }
        changed
    }

    /// Mark every entry as read and return how many changed.
    pub fn mark_all_read(&self) -> usize {
        let changed = {
            let mut entries = self.lock();
            let mut count = 0;
            for n in entries.iter_mut().filter(|n| !n.read) {
                n.read = true;
                count += 1;
            }
            count
        };
        if changed > 0 {
            self.emit(NotificationChange::AllRead);
        }
        changed
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let removed = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|n| n.id != id);
            entries.len() != before
        };
        if removed {
            self.emit(NotificationChange::Removed(id));
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.emit(NotificationChange::Cleared);
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|n| !n.read).count()
    }

    /// Snapshot of all entries, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationChange> {
        self.changes.subscribe()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NOTIFICATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn push_lists_newest_first_and_counts_unread() {
        let center = NotificationCenter::default();
        center.push(Notification::new(NotificationKind::Info, "first"));
        center.push(Notification::new(NotificationKind::Info, "second"));

        let list = center.list();
        assert_eq!(list[0].title, "second");
        assert_eq!(center.unread_count(), 2);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let center = NotificationCenter::default();
        let id = center.push(Notification::new(NotificationKind::Info, "x"));
        assert!(center.mark_read(id));
        assert!(!center.mark_read(id));
        assert!(!center.mark_read(Uuid::new_v4()));
        assert_eq!(center.unread_count(), 0);
    }

    #[test]
    fn mark_all_read_reports_changed_count() {
        let center = NotificationCenter::default();
        let id = center.push(Notification::new(NotificationKind::Info, "a"));
        center.push(Notification::new(NotificationKind::Info, "b"));
        center.mark_read(id);
        assert_eq!(center.mark_all_read(), 1);
        assert_eq!(center.mark_all_read(), 0);
    }

    #[test]
    fn capacity_drops_oldest() {
        let center = NotificationCenter::new(2);
        center.push(Notification::new(NotificationKind::Info, "1"));
        center.push(Notification::new(NotificationKind::Info, "2"));
        center.push(Notification::new(NotificationKind::Info, "3"));
        let titles: Vec<String> = center.list().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["3", "2"]);
    }

    #[test]
    fn remove_and_clear() {
        let center = NotificationCenter::default();
        let id = center.push(Notification::new(NotificationKind::Info, "a"));
        center.push(Notification::new(NotificationKind::Info, "b"));
        assert!(center.remove(id));
        assert!(!center.remove(id));
        assert_eq!(center.len(), 1);
        center.clear();
        assert!(center.is_empty());
    }

    #[tokio::test]
    async fn changes_are_broadcast() {
        let center = NotificationCenter::default();
        let mut rx = center.subscribe();
        let id = center.push(Notification::new(NotificationKind::Info, "a"));
        center.mark_read(id);
        center.clear();

        assert_eq!(rx.recv().await.unwrap(), NotificationChange::Added(id));
        assert_eq!(rx.recv().await.unwrap(), NotificationChange::Read(id));
        assert_eq!(rx.recv().await.unwrap(), NotificationChange::Cleared);
    }

    #[test]
    fn invitation_accepted_uses_name_or_email() {
        let at = Utc::now();
        let named = Notification::invitation_accepted(Some("Ada".into()), "ada@x.com", at);
        assert_eq!(named.title, "Ada accepted your invitation");
        assert_eq!(named.accepted_at, Some(at));

        let anon = Notification::invitation_accepted(None, "bo@x.com", at);
        assert_eq!(anon.title, "bo@x.com accepted your invitation");
    }

    #[test]
    fn job_outcome_entries() {
        let done = Notification::from_job_outcome("j-1", JobStatus::Completed, Some("s-1".into()), None)
            .expect("completed jobs notify");
        assert_eq!(done.kind, NotificationKind::JobCompleted);
        assert_eq!(done.resource_id.as_deref(), Some("s-1"));

        let failed = Notification::from_job_outcome("j-2", JobStatus::Failed, None, Some("boom"));
        assert_matches!(failed, Some(Notification { kind: NotificationKind::JobFailed, .. }));

        assert!(Notification::from_job_outcome("j-3", JobStatus::Cancelled, None, None).is_none());
        assert!(Notification::from_job_outcome("j-4", JobStatus::Processing, None, None).is_none());
    }
}
