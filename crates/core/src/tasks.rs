//! Project tasks and the list helpers behind the task board.
//!
//! All functions here are pure transformations over a snapshot already
//! fetched from the server: filter by a predicate set, sort by a key and
//! direction, and group by a dimension.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Status / priority names
// ---------------------------------------------------------------------------

pub const TASK_STATUS_TODO: &str = "todo";
pub const TASK_STATUS_IN_PROGRESS: &str = "in_progress";
pub const TASK_STATUS_BLOCKED: &str = "blocked";
pub const TASK_STATUS_COMPLETED: &str = "completed";
pub const TASK_STATUS_CANCELLED: &str = "cancelled";

pub const VALID_TASK_STATUSES: &[&str] = &[
    TASK_STATUS_TODO,
    TASK_STATUS_IN_PROGRESS,
    TASK_STATUS_BLOCKED,
    TASK_STATUS_COMPLETED,
    TASK_STATUS_CANCELLED,
];

pub const PRIORITY_LOW: &str = "low";
pub const PRIORITY_MEDIUM: &str = "medium";
pub const PRIORITY_HIGH: &str = "high";
pub const PRIORITY_URGENT: &str = "urgent";

pub const VALID_PRIORITIES: &[&str] = &[PRIORITY_LOW, PRIORITY_MEDIUM, PRIORITY_HIGH, PRIORITY_URGENT];

/// Group label for tasks with no assignee.
pub const UNASSIGNED_LABEL: &str = "Unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        Self::Todo,
        Self::InProgress,
        Self::Blocked,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => TASK_STATUS_TODO,
            Self::InProgress => TASK_STATUS_IN_PROGRESS,
            Self::Blocked => TASK_STATUS_BLOCKED,
            Self::Completed => TASK_STATUS_COMPLETED,
            Self::Cancelled => TASK_STATUS_CANCELLED,
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            TASK_STATUS_TODO => Ok(Self::Todo),
            TASK_STATUS_IN_PROGRESS => Ok(Self::InProgress),
            TASK_STATUS_BLOCKED => Ok(Self::Blocked),
            TASK_STATUS_COMPLETED => Ok(Self::Completed),
            TASK_STATUS_CANCELLED => Ok(Self::Cancelled),
            other => Err(CoreError::unknown("task status", other, VALID_TASK_STATUSES)),
        }
    }

    /// Completed and cancelled tasks are closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => PRIORITY_LOW,
            Self::Medium => PRIORITY_MEDIUM,
            Self::High => PRIORITY_HIGH,
            Self::Urgent => PRIORITY_URGENT,
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            PRIORITY_LOW => Ok(Self::Low),
            PRIORITY_MEDIUM => Ok(Self::Medium),
            PRIORITY_HIGH => Ok(Self::High),
            PRIORITY_URGENT => Ok(Self::Urgent),
            other => Err(CoreError::unknown("task priority", other, VALID_PRIORITIES)),
        }
    }
}

/// A task extracted from project content or created by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub project_id: EntityId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl Task {
    /// Past its due date and still open.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        !self.status.is_closed() && self.due_date.is_some_and(|due| due < now)
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Predicate set for the task list. Empty sets place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub statuses: HashSet<TaskStatus>,
    #[serde(default)]
    pub priorities: HashSet<TaskPriority>,
    #[serde(default)]
    pub project_ids: HashSet<EntityId>,
    #[serde(default)]
    pub assignee: Option<String>,
    /// Case-insensitive substring over title, description, and assignee.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub overdue_only: bool,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task, now: Timestamp) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&task.priority) {
            return false;
        }
        if !self.project_ids.is_empty() && !self.project_ids.contains(&task.project_id) {
            return false;
        }
        if let Some(ref who) = self.assignee {
            let matches_assignee = task
                .assignee
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(who));
            if !matches_assignee {
                return false;
            }
        }
        if self.overdue_only && !task.is_overdue(now) {
            return false;
        }
        match normalized_search(self.search.as_deref()) {
            Some(needle) => [
                Some(task.title.as_str()),
                task.description.as_deref(),
                task.assignee.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle)),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &TaskFilter::default()
    }
}

/// Lowercased, trimmed search term, or `None` when blank.
pub(crate) fn normalized_search(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

pub fn filter_tasks(tasks: &[Task], filter: &TaskFilter, now: Timestamp) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| filter.matches(t, now))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSortKey {
    #[default]
    DueDate,
    Priority,
    Status,
    CreatedAt,
    Title,
}

/// Sort in place. Tasks without a due date go last in either direction
/// when sorting by due date; ties keep their original order.
pub fn sort_tasks(tasks: &mut [Task], key: TaskSortKey, direction: SortDirection) {
    use std::cmp::Ordering;

    let directed = |ord: Ordering| match direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    };

    tasks.sort_by(|a, b| match key {
        TaskSortKey::DueDate => match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => directed(x.cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        TaskSortKey::Priority => directed(a.priority.cmp(&b.priority)),
        TaskSortKey::Status => directed(a.status.cmp(&b.status)),
        TaskSortKey::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
        TaskSortKey::Title => directed(a.title.to_lowercase().cmp(&b.title.to_lowercase())),
    });
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskGroupBy {
    #[default]
    Status,
    Priority,
    Project,
    Assignee,
}

/// One labelled bucket of tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskGroup {
    pub key: String,
    pub tasks: Vec<Task>,
}

/// Group tasks, keeping input order inside each group.
///
/// Status and priority groups follow enum order (priority from urgent
/// down); project and assignee groups are alphabetical, with
/// [`UNASSIGNED_LABEL`] last. Empty groups are omitted.
pub fn group_tasks(tasks: &[Task], by: TaskGroupBy) -> Vec<TaskGroup> {
    match by {
        TaskGroupBy::Status => TaskStatus::ALL
            .iter()
            .map(|s| TaskGroup {
                key: s.as_str().to_string(),
                tasks: tasks.iter().filter(|t| t.status == *s).cloned().collect(),
            })
            .filter(|g| !g.tasks.is_empty())
            .collect(),
        TaskGroupBy::Priority => TaskPriority::ALL
            .iter()
            .rev()
            .map(|p| TaskGroup {
                key: p.as_str().to_string(),
                tasks: tasks.iter().filter(|t| t.priority == *p).cloned().collect(),
            })
            .filter(|g| !g.tasks.is_empty())
            .collect(),
        TaskGroupBy::Project => group_by_label(tasks, |t| Some(t.project_id.as_str())),
        TaskGroupBy::Assignee => group_by_label(tasks, |t| t.assignee.as_deref()),
    }
}

fn group_by_label<'a>(tasks: &'a [Task], label: impl Fn(&'a Task) -> Option<&'a str>) -> Vec<TaskGroup> {
    let mut named: BTreeMap<&str, Vec<Task>> = BTreeMap::new();
    let mut unassigned = Vec::new();

    for task in tasks {
        match label(task).filter(|l| !l.is_empty()) {
            Some(l) => named.entry(l).or_default().push(task.clone()),
            None => unassigned.push(task.clone()),
        }
    }

    let mut groups: Vec<TaskGroup> = named
        .into_iter()
        .map(|(key, tasks)| TaskGroup {
            key: key.to_string(),
            tasks,
        })
        .collect();
    if !unassigned.is_empty() {
        groups.push(TaskGroup {
            key: UNASSIGNED_LABEL.to_string(),
            tasks: unassigned,
        });
    }
    groups
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Headline counts for a task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub open: usize,
    pub completed: usize,
    pub blocked: usize,
    pub overdue: usize,
}

impl TaskStats {
    pub fn compute(tasks: &[Task], now: Timestamp) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, t| {
            stats.total += 1;
            if !t.status.is_closed() {
                stats.open += 1;
            }
            if t.status == TaskStatus::Completed {
                stats.completed += 1;
            }
            if t.status == TaskStatus::Blocked {
                stats.blocked += 1;
            }
            if t.is_overdue(now) {
                stats.overdue += 1;
            }
            stats
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
