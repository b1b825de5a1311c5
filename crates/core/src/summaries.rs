//! Generated summaries and their list helpers.
//!
//! Summaries arrive with nested action items, decisions, and risks. These
//! are typed here so shape problems surface when the payload is decoded:
//! missing lists default to empty, unknown enum values are rejected.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::tasks::{normalized_search, SortDirection, TaskPriority};
use crate::types::{EntityId, Timestamp};

pub const SUMMARY_TYPE_MEETING: &str = "meeting";
pub const SUMMARY_TYPE_PROJECT: &str = "project";
pub const SUMMARY_TYPE_PROGRAM: &str = "program";
pub const SUMMARY_TYPE_PORTFOLIO: &str = "portfolio";

pub const VALID_SUMMARY_TYPES: &[&str] = &[
    SUMMARY_TYPE_MEETING,
    SUMMARY_TYPE_PROJECT,
    SUMMARY_TYPE_PROGRAM,
    SUMMARY_TYPE_PORTFOLIO,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Meeting,
    Project,
    Program,
    Portfolio,
}

impl SummaryType {
    pub const ALL: [SummaryType; 4] = [Self::Meeting, Self::Project, Self::Program, Self::Portfolio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meeting => SUMMARY_TYPE_MEETING,
            Self::Project => SUMMARY_TYPE_PROJECT,
            Self::Program => SUMMARY_TYPE_PROGRAM,
            Self::Portfolio => SUMMARY_TYPE_PORTFOLIO,
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            SUMMARY_TYPE_MEETING => Ok(Self::Meeting),
            SUMMARY_TYPE_PROJECT => Ok(Self::Project),
            SUMMARY_TYPE_PROGRAM => Ok(Self::Program),
            SUMMARY_TYPE_PORTFOLIO => Ok(Self::Portfolio),
            other => Err(CoreError::unknown("summary type", other, VALID_SUMMARY_TYPES)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub title: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub description: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub description: String,
    #[serde(default)]
    pub severity: Option<TaskPriority>,
    #[serde(default)]
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: EntityId,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    pub summary_type: SummaryType,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub risks: Vec<Risk>,
    pub created_at: Timestamp,
}

/// Predicate set for the summary list. Empty sets place no constraint;
/// `from` is inclusive and `to` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryFilter {
    #[serde(default)]
    pub types: HashSet<SummaryType>,
    #[serde(default)]
    pub project_ids: HashSet<EntityId>,
    #[serde(default)]
    pub from: Option<Timestamp>,
    #[serde(default)]
    pub to: Option<Timestamp>,
    /// Case-insensitive substring over subject and body.
    #[serde(default)]
    pub search: Option<String>,
}

impl SummaryFilter {
    pub fn matches(&self, summary: &Summary) -> bool {
        if !self.types.is_empty() && !self.types.contains(&summary.summary_type) {
            return false;
        }
        if !self.project_ids.is_empty() {
            let in_project = summary
                .project_id
                .as_ref()
                .is_some_and(|p| self.project_ids.contains(p));
            if !in_project {
                return false;
            }
        }
        if self.from.is_some_and(|from| summary.created_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| summary.created_at >= to) {
            return false;
        }
        match normalized_search(self.search.as_deref()) {
            Some(needle) => {
                summary.subject.to_lowercase().contains(&needle)
                    || summary.body.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

pub fn filter_summaries(summaries: &[Summary], filter: &SummaryFilter) -> Vec<Summary> {
    summaries
        .iter()
        .filter(|s| filter.matches(s))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySortKey {
    #[default]
    CreatedAt,
    Subject,
}

pub fn sort_summaries(summaries: &mut [Summary], key: SummarySortKey, direction: SortDirection) {
    summaries.sort_by(|a, b| {
        let ord = match key {
            SummarySortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SummarySortKey::Subject => a.subject.to_lowercase().cmp(&b.subject.to_lowercase()),
        };
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

/// Group by summary type in enum order, omitting empty groups.
pub fn group_summaries_by_type(summaries: &[Summary]) -> Vec<(SummaryType, Vec<Summary>)> {
    SummaryType::ALL
        .iter()
        .map(|ty| {
            let members: Vec<Summary> = summaries
                .iter()
                .filter(|s| s.summary_type == *ty)
                .cloned()
                .collect();
            (*ty, members)
        })
        .filter(|(_, members)| !members.is_empty())
        .collect()
}

/// Every incomplete action item across the given summaries, paired with
/// the id of the summary it came from.
pub fn open_action_items(summaries: &[Summary]) -> Vec<(&str, &ActionItem)> {
    summaries
        .iter()
        .flat_map(|s| {
            s.action_items
                .iter()
                .filter(|a| !a.completed)
                .map(move |a| (s.id.as_str(), a))
        })
        .collect()
}
