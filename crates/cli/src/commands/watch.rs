//! `tellmemo watch <job_id>`: follow a job over the job channel.

use std::sync::Arc;

use anyhow::bail;
use tellmemo_client::channel::{ChannelError, JobChannel};
use tellmemo_client::tracker::{JobObserver, JobTracker, NotifyingObserver, TerminalOutcome};
use tellmemo_core::job::JobSnapshot;
use tellmemo_events::{EventBus, NotificationCenter};

use crate::config::ClientConfig;

/// Prints progress lines and forwards outcomes to the notification center.
struct ConsoleObserver {
    notify: NotifyingObserver,
    last_line: Option<String>,
}

impl JobObserver for ConsoleObserver {
    fn on_progress(&mut self, snapshot: &JobSnapshot) {
        let line = format_progress(snapshot);
        if self.last_line.as_deref() != Some(line.as_str()) {
            println!("{line}");
            self.last_line = Some(line);
        }
    }

    fn on_completed(&mut self, snapshot: &JobSnapshot, result_id: Option<&str>) {
        self.notify.on_completed(snapshot, result_id);
    }

    fn on_failed(&mut self, snapshot: &JobSnapshot, error: &str) {
        self.notify.on_failed(snapshot, error);
    }

    fn on_cancelled(&mut self, snapshot: &JobSnapshot) {
        self.notify.on_cancelled(snapshot);
    }

    fn on_connection_error(&mut self, error: &ChannelError) {
        eprintln!("Waiting for job channel: {error}");
    }
}

/// One-line progress, e.g. `[ 40%] processing - Step 2 of 5: Summarizing`.
pub fn format_progress(snapshot: &JobSnapshot) -> String {
    let mut line = format!("[{:>3.0}%] {}", snapshot.progress, snapshot.status);
    if let Some(step) = snapshot.step_label() {
        line.push_str(" - ");
        line.push_str(&step);
    }
    line
}

pub async fn run(config: &ClientConfig, job_id: &str, result_key: String) -> anyhow::Result<()> {
    let channel = JobChannel::new(config.channel_config());
    let bus = Arc::new(EventBus::default());
    let notifications = Arc::new(NotificationCenter::default());

    let observer = ConsoleObserver {
        notify: NotifyingObserver::new(Arc::clone(&bus), Arc::clone(&notifications)),
        last_line: None,
    };
    let mut tracker = JobTracker::spawn(&channel, job_id, Some(result_key), observer);

    tracing::info!(job_id, "Watching job");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        outcome = tracker.finished() => outcome,
    };
    tracker.dispose();

    channel.shutdown().await;

    for n in notifications.list() {
        println!("{}{}", n.title, n.message.map(|m| format!(": {m}")).unwrap_or_default());
    }

    match outcome {
        Some(TerminalOutcome::Completed { result_id }) => {
            match result_id {
                Some(id) => println!("Result: {id}"),
                None => println!("Job finished without a result id"),
            }
            Ok(())
        }
        Some(TerminalOutcome::Failed { error }) => bail!("Job {job_id} failed: {error}"),
        Some(TerminalOutcome::Cancelled) => {
            println!("Job {job_id} was cancelled");
            Ok(())
        }
        None => {
            println!("Stopped watching {job_id}");
            Ok(())
        }
    }
}
