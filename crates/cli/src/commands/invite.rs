//! `tellmemo invite <org_id> <csv>`: bulk invitations from a CSV file.

use anyhow::{bail, Context};
use tellmemo_client::invites::{send_bulk_invites, BulkInviteReport};
use tellmemo_core::bulk_invite::{parse_invite_csv, InviteEntry};
use tellmemo_core::roles::OrgRole;

use crate::cli::InviteArgs;
use crate::config::ClientConfig;

pub async fn run(config: &ClientConfig, args: &InviteArgs) -> anyhow::Result<()> {
    let default_role = match args.default_role.as_deref() {
        Some(role) => OrgRole::from_str(&role.to_lowercase()).context("Invalid --default-role")?,
        None => config.default_invite_role,
    };

    let input = std::fs::read_to_string(&args.csv)
        .with_context(|| format!("Failed to read {}", args.csv.display()))?;
    let parsed = parse_invite_csv(&input, default_role);

    if parsed.entries.is_empty() {
        bail!("{}", parsed.errors.join("\n"));
    }
    for error in &parsed.errors {
        eprintln!("{error}");
    }

    if args.dry_run {
        for entry in &parsed.entries {
            println!("{}", format_entry(entry));
        }
        println!("{} invitation(s) would be sent", parsed.entries.len());
        return Ok(());
    }

    let api = config.api();
    let report = send_bulk_invites(&api, &args.org_id, &parsed.entries, config.invite_delay).await;

    for line in format_report(&report) {
        println!("{line}");
    }
    if report.success_count() == 0 {
        bail!("No invitations were sent");
    }
    Ok(())
}

pub fn format_entry(entry: &InviteEntry) -> String {
    match entry.name.as_deref() {
        Some(name) => format!("{} <{}> as {}", name, entry.email, entry.role),
        None => format!("{} as {}", entry.email, entry.role),
    }
}

pub fn format_report(report: &BulkInviteReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sent {} of {} invitation(s)",
        report.success_count(),
        report.total()
    )];
    lines.extend(
        report
            .failed
            .iter()
            .map(|f| format!("  failed {}: {}", f.email, f.reason)),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use tellmemo_client::invites::InviteFailure;

    #[test]
    fn entry_line_includes_name_when_present() {
        let entry = InviteEntry {
            email: "a@x.com".into(),
            name: Some("Bob".into()),
            role: OrgRole::Admin,
        };
        assert_eq!(format_entry(&entry), "Bob <a@x.com> as admin");

        let anon = InviteEntry {
            name: None,
            ..entry
        };
        assert_eq!(format_entry(&anon), "a@x.com as admin");
    }

    #[test]
    fn report_lists_failures() {
        let report = BulkInviteReport {
            succeeded: vec!["a@x.com".into()],
            failed: vec![InviteFailure {
                email: "b@x.com".into(),
                reason: "already a member".into(),
            }],
        };
        assert_eq!(
            format_report(&report),
            vec![
                "Sent 1 of 2 invitation(s)".to_string(),
                "  failed b@x.com: already a member".to_string(),
            ]
        );
    }
}
