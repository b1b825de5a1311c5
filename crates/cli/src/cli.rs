//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tellmemo_core::summaries::SummarySortKey;
use tellmemo_core::tasks::{SortDirection, TaskGroupBy, TaskSortKey};

#[derive(Debug, Parser)]
#[command(name = "tellmemo", version, about = "TellMeMo job and organization client")]
pub struct Cli {
    /// API base URL (overrides TELLMEMO_API_URL).
    #[arg(long, global = true, env = "TELLMEMO_API_URL")]
    pub api_url: Option<String>,

    /// WebSocket base URL (overrides TELLMEMO_WS_URL).
    #[arg(long, global = true, env = "TELLMEMO_WS_URL")]
    pub ws_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow a job until it finishes
    Watch {
        job_id: String,
        /// Result field to report on completion
        #[arg(long, default_value = "summary_id")]
        result_key: String,
    },
    /// Cancel a running job
    Cancel {
        job_id: String,
        /// Send the request over the job channel and wait for confirmation
        #[arg(long)]
        ws: bool,
    },
    /// Invite people to an organization from a CSV file
    Invite(InviteArgs),
    /// List a project's tasks
    Tasks(TaskArgs),
    /// List a project's summaries
    Summaries(SummaryArgs),
}

#[derive(Debug, Args)]
pub struct InviteArgs {
    pub org_id: String,
    /// CSV with an email column and optional name and role columns
    pub csv: PathBuf,
    /// Role for rows without a recognised role (overrides TELLMEMO_DEFAULT_INVITE_ROLE)
    #[arg(long)]
    pub default_role: Option<String>,
    /// Parse and print the entries without sending anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct TaskArgs {
    pub project_id: String,
    /// Only these statuses (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<String>,
    /// Only these priorities (repeatable)
    #[arg(long = "priority")]
    pub priorities: Vec<String>,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub overdue: bool,
    /// Sort key; remembered for next time
    #[arg(long, value_enum)]
    pub sort: Option<TaskSortArg>,
    /// Sort descending; remembered for next time
    #[arg(long)]
    pub desc: bool,
    /// Grouping; remembered for next time
    #[arg(long, value_enum)]
    pub group: Option<TaskGroupArg>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    pub project_id: String,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long, value_enum, default_value_t = SummarySortArg::Newest)]
    pub sort: SummarySortArg,
    /// Also list open action items
    #[arg(long)]
    pub actions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskSortArg {
    Due,
    Priority,
    Status,
    Created,
    Title,
}

impl From<TaskSortArg> for TaskSortKey {
    fn from(arg: TaskSortArg) -> Self {
        match arg {
            TaskSortArg::Due => TaskSortKey::DueDate,
            TaskSortArg::Priority => TaskSortKey::Priority,
            TaskSortArg::Status => TaskSortKey::Status,
            TaskSortArg::Created => TaskSortKey::CreatedAt,
            TaskSortArg::Title => TaskSortKey::Title,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskGroupArg {
    Status,
    Priority,
    Project,
    Assignee,
}

impl From<TaskGroupArg> for TaskGroupBy {
    fn from(arg: TaskGroupArg) -> Self {
        match arg {
            TaskGroupArg::Status => TaskGroupBy::Status,
            TaskGroupArg::Priority => TaskGroupBy::Priority,
            TaskGroupArg::Project => TaskGroupBy::Project,
            TaskGroupArg::Assignee => TaskGroupBy::Assignee,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummarySortArg {
    Newest,
    Oldest,
    Subject,
}

impl SummarySortArg {
    pub fn key_and_direction(self) -> (SummarySortKey, SortDirection) {
        match self {
            Self::Newest => (SummarySortKey::CreatedAt, SortDirection::Descending),
            Self::Oldest => (SummarySortKey::CreatedAt, SortDirection::Ascending),
            Self::Subject => (SummarySortKey::Subject, SortDirection::Ascending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_watch() {
        let cli = Cli::try_parse_from(["tellmemo", "watch", "j-1"]).unwrap();
        assert_matches!(cli.command, Command::Watch { job_id, result_key } if job_id == "j-1" && result_key == "summary_id");
    }

    #[test]
    fn parses_repeated_task_filters() {
        let cli = Cli::try_parse_from([
            "tellmemo", "tasks", "p-1", "--status", "todo", "--status", "blocked", "--sort", "priority", "--desc",
        ])
        .unwrap();
        let Command::Tasks(args) = cli.command else {
            panic!("expected tasks command");
        };
        assert_eq!(args.statuses, vec!["todo", "blocked"]);
        assert_eq!(args.sort.map(TaskSortKey::from), Some(TaskSortKey::Priority));
        assert!(args.desc);
        assert!(args.group.is_none());
    }

    #[test]
    fn parses_invite_dry_run() {
        let cli = Cli::try_parse_from(["tellmemo", "invite", "org-1", "people.csv", "--dry-run"]).unwrap();
        assert_matches!(cli.command, Command::Invite(InviteArgs { dry_run: true, .. }));
    }

    #[test]
    fn rejects_unknown_sort() {
        assert!(Cli::try_parse_from(["tellmemo", "tasks", "p-1", "--sort", "random"]).is_err());
    }
}
