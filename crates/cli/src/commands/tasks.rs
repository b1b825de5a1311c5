//! `tellmemo tasks <project_id>`: filtered, sorted, grouped task list.
//!
//! Sort and grouping choices given on the command line are remembered in
//! the preference file and reused when omitted.

use std::collections::HashSet;

use chrono::Utc;
use tellmemo_core::error::CoreError;
use tellmemo_core::tasks::{
    filter_tasks, group_tasks, sort_tasks, SortDirection, Task, TaskFilter, TaskGroupBy,
    TaskPriority, TaskSortKey, TaskStats, TaskStatus,
};
use tellmemo_core::types::Timestamp;

use crate::cli::TaskArgs;
use crate::config::ClientConfig;
use crate::preferences::{
    PreferenceError, PreferenceStore, PREF_TASK_GROUP, PREF_TASK_SORT, PREF_TASK_SORT_DIRECTION,
};

/// Effective sort and grouping for one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskView {
    pub sort: TaskSortKey,
    pub direction: SortDirection,
    pub group: TaskGroupBy,
}

impl TaskView {
    /// Command-line values win and are saved; missing ones come from
    /// `prefs`, then defaults.
    pub fn resolve(args: &TaskArgs, prefs: &mut PreferenceStore) -> Result<Self, PreferenceError> {
        let sort = match args.sort {
            Some(arg) => {
                let key = TaskSortKey::from(arg);
                prefs.set(PREF_TASK_SORT, &key)?;
                key
            }
            None => prefs.get(PREF_TASK_SORT).unwrap_or_default(),
        };

        let direction = if args.desc || args.sort.is_some() {
            let direction = if args.desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            prefs.set(PREF_TASK_SORT_DIRECTION, &direction)?;
            direction
        } else {
            prefs.get(PREF_TASK_SORT_DIRECTION).unwrap_or_default()
        };

        let group = match args.group {
            Some(arg) => {
                let group = TaskGroupBy::from(arg);
                prefs.set(PREF_TASK_GROUP, &group)?;
                group
            }
            None => prefs.get(PREF_TASK_GROUP).unwrap_or_default(),
        };

        Ok(Self {
            sort,
            direction,
            group,
        })
    }
}

pub fn build_filter(args: &TaskArgs) -> Result<TaskFilter, CoreError> {
    let statuses = args
        .statuses
        .iter()
        .map(|s| TaskStatus::from_str(s))
        .collect::<Result<HashSet<_>, _>>()?;
    let priorities = args
        .priorities
        .iter()
        .map(|p| TaskPriority::from_str(p))
        .collect::<Result<HashSet<_>, _>>()?;

    Ok(TaskFilter {
        statuses,
        priorities,
        project_ids: HashSet::new(),
        assignee: args.assignee.clone(),
        search: args.search.clone(),
        overdue_only: args.overdue,
    })
}

pub fn format_task(task: &Task, now: Timestamp) -> String {
    let mut line = format!("[{}] {}", task.priority.as_str(), task.title);
    let mut details = Vec::new();
    if let Some(due) = task.due_date {
        details.push(format!("due {}", due.format("%Y-%m-%d")));
    }
    if let Some(ref who) = task.assignee {
        details.push(who.clone());
    }
    if !details.is_empty() {
        line.push_str(&format!(" ({})", details.join(", ")));
    }
    if task.is_overdue(now) {
        line.push_str(" OVERDUE");
    }
    line
}

pub async fn run(config: &ClientConfig, args: &TaskArgs) -> anyhow::Result<()> {
    let mut prefs = PreferenceStore::open(&config.prefs_path)?;
    let view = TaskView::resolve(args, &mut prefs)?;
    let filter = build_filter(args)?;

    let tasks = config.api().list_tasks(&args.project_id).await?;
    let now = Utc::now();

    let mut visible = filter_tasks(&tasks, &filter, now);
    sort_tasks(&mut visible, view.sort, view.direction);

    for group in group_tasks(&visible, view.group) {
        println!("{} ({})", group.key, group.tasks.len());
        for task in &group.tasks {
            println!("  {}", format_task(task, now));
        }
    }

    let stats = TaskStats::compute(&visible, now);
    println!(
        "{} of {} task(s) shown: {} open, {} blocked, {} overdue",
        stats.total,
        tasks.len(),
        stats.open,
        stats.blocked,
        stats.overdue
    );
    Ok(())
}
