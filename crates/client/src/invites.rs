//! Sequential bulk-invite sender.
//!
//! Sends one invitation per parsed CSV entry, in order, with a short
//! delay between requests. Each failure is recorded with its reason;
//! invitations already sent are never rolled back.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tellmemo_core::bulk_invite::InviteEntry;
use tellmemo_events::bus::{ClientEvent, EVENT_INVITES_SENT};

use crate::api::{ApiError, TellMeMoApi};

/// Something that can deliver a single organization invitation.
#[async_trait]
pub trait InvitationSender: Send + Sync {
    /// Send one invitation. The error string is shown to the user.
    async fn send_invitation(&self, org_id: &str, entry: &InviteEntry) -> Result<(), String>;
}

#[async_trait]
impl InvitationSender for TellMeMoApi {
    async fn send_invitation(&self, org_id: &str, entry: &InviteEntry) -> Result<(), String> {
        TellMeMoApi::send_invitation(self, org_id, entry)
            .await
            .map_err(|e: ApiError| e.user_message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteFailure {
    pub email: String,
    pub reason: String,
}

/// Per-item outcome of a bulk send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkInviteReport {
    /// Emails invited successfully, in send order.
    pub succeeded: Vec<String>,
    pub failed: Vec<InviteFailure>,
}

impl BulkInviteReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Some, but not all, invitations went out.
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// `invites.sent` event carrying the counts and failed emails.
    pub fn to_event(&self, org_id: &str) -> ClientEvent {
        let failed: Vec<&str> = self.failed.iter().map(|f| f.email.as_str()).collect();
        ClientEvent::new(EVENT_INVITES_SENT).with_payload(serde_json::json!({
            "org_id": org_id,
            "sent": self.success_count(),
            "failed": failed,
        }))
    }
}

/// Send `entries` one at a time, sleeping `delay` between sends.
pub async fn send_bulk_invites<S>(
    sender: &S,
    org_id: &str,
    entries: &[InviteEntry],
    delay: Duration,
) -> BulkInviteReport
where
    S: InvitationSender + ?Sized,
{
    let mut report = BulkInviteReport::default();

    for (index, entry) in entries.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match sender.send_invitation(org_id, entry).await {
            Ok(()) => {
                tracing::debug!(org_id, email = %entry.email, role = %entry.role, "Invitation sent");
                report.succeeded.push(entry.email.clone());
            }
            Err(reason) => {
                tracing::warn!(org_id, email = %entry.email, reason = %reason, "Invitation failed");
                report.failed.push(InviteFailure {
                    email: entry.email.clone(),
                    reason,
                });
            }
        }
    }

    tracing::info!(
        org_id,
        sent = report.success_count(),
        failed = report.failure_count(),
        "Bulk invite finished",
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tellmemo_core::roles::OrgRole;

    /// Fails for any email listed in `reject`.
    struct FakeSender {
        reject: Vec<&'static str>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InvitationSender for FakeSender {
        async fn send_invitation(&self, _org_id: &str, entry: &InviteEntry) -> Result<(), String> {
            self.sent.lock().unwrap().push(entry.email.clone());
            if self.reject.contains(&entry.email.as_str()) {
                Err("already a member".into())
            } else {
                Ok(())
            }
        }
    }

    fn entry(email: &str) -> InviteEntry {
        InviteEntry {
            email: email.into(),
            name: None,
            role: OrgRole::Member,
        }
    }

    #[tokio::test]
    async fn partial_failure_is_reported_per_item() {
        let sender = FakeSender {
            reject: vec!["b@x.com"],
            sent: Mutex::new(Vec::new()),
        };
        let entries = [entry("a@x.com"), entry("b@x.com"), entry("c@x.com")];

        let report = send_bulk_invites(&sender, "org", &entries, Duration::ZERO).await;

        assert_eq!(report.succeeded, vec!["a@x.com", "c@x.com"]);
        assert_eq!(
            report.failed,
            vec![InviteFailure {
                email: "b@x.com".into(),
                reason: "already a member".into(),
            }]
        );
        assert_eq!(report.total(), 3);
        assert!(report.is_partial());
        assert_eq!(*sender.sent.lock().unwrap(), vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_applied_between_sends() {
        let sender = FakeSender {
            reject: vec![],
            sent: Mutex::new(Vec::new()),
        };
        let entries = [entry("a@x.com"), entry("b@x.com"), entry("c@x.com")];

        let start = tokio::time::Instant::now();
        let report = send_bulk_invites(&sender, "org", &entries, Duration::from_millis(300)).await;

        assert!(start.elapsed() >= Duration::from_millis(600));
        assert_eq!(report.success_count(), 3);
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let sender = FakeSender {
            reject: vec![],
            sent: Mutex::new(Vec::new()),
        };
        let report = send_bulk_invites(&sender, "org", &[], Duration::from_secs(1)).await;
        assert_eq!(report.total(), 0);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn report_event_lists_failed_emails() {
        let report = BulkInviteReport {
            succeeded: vec!["a@x.com".into()],
            failed: vec![InviteFailure {
                email: "b@x.com".into(),
                reason: "nope".into(),
            }],
        };
        let event = report.to_event("org-1");
        assert_eq!(event.event_type, EVENT_INVITES_SENT);
        assert_eq!(
            event.payload,
            serde_json::json!({"org_id": "org-1", "sent": 1, "failed": ["b@x.com"]})
        );
    }
}
