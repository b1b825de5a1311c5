//! `tellmemo summaries <project_id>`: summaries grouped by type, with a
//! badge on ones created in the last few minutes.

use chrono::Utc;
use tellmemo_core::recent::RecentItems;
use tellmemo_core::summaries::{
    filter_summaries, group_summaries_by_type, open_action_items, sort_summaries, ActionItem,
    Summary, SummaryFilter,
};
use tellmemo_core::types::Timestamp;

use crate::cli::SummaryArgs;
use crate::config::ClientConfig;

/// Mark every summary as new from its creation time.
pub fn recent_summaries(summaries: &[Summary]) -> RecentItems {
    let mut recent = RecentItems::new();
    for s in summaries {
        recent.mark_new(s.id.clone(), s.created_at);
    }
    recent
}

pub fn format_summary(summary: &Summary, recent: &RecentItems, now: Timestamp) -> String {
    let badge = if recent.is_new(&summary.id, now) { " [new]" } else { "" };
    format!(
        "{} {}{}",
        summary.created_at.format("%Y-%m-%d %H:%M"),
        summary.subject,
        badge
    )
}

pub fn format_action_item(summary_id: &str, item: &ActionItem) -> String {
    let mut line = format!("- {}", item.title);
    if let Some(ref who) = item.assignee {
        line.push_str(&format!(" @{who}"));
    }
    if let Some(priority) = item.priority {
        line.push_str(&format!(" [{}]", priority.as_str()));
    }
    line.push_str(&format!(" (summary {summary_id})"));
    line
}

pub async fn run(config: &ClientConfig, args: &SummaryArgs) -> anyhow::Result<()> {
    let summaries = config.api().list_summaries(&args.project_id).await?;

    let filter = SummaryFilter {
        search: args.search.clone(),
        ..Default::default()
    };
    let mut visible = filter_summaries(&summaries, &filter);
    let (key, direction) = args.sort.key_and_direction();
    sort_summaries(&mut visible, key, direction);

    let now = Utc::now();
    let recent = recent_summaries(&visible);

    for (summary_type, group) in group_summaries_by_type(&visible) {
        println!("{} ({})", summary_type.as_str(), group.len());
        for summary in &group {
            println!("  {}", format_summary(summary, &recent, now));
        }
    }

    if args.actions {
        let items = open_action_items(&visible);
        println!("Open action items ({})", items.len());
        for (summary_id, item) in items {
            println!("  {}", format_action_item(summary_id, item));
        }
    }
    Ok(())
}
