//! `tellmemo cancel <job_id>`: request cancellation of a job.

use std::time::Duration;

use anyhow::Context;
use tellmemo_client::channel::JobChannel;
use tellmemo_core::job::JobStatus;

use crate::config::ClientConfig;

/// How long `--ws` waits for the server to confirm the job stopped.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: &ClientConfig, job_id: &str, via_channel: bool) -> anyhow::Result<()> {
    if !via_channel {
        config
            .api()
            .cancel_job(job_id)
            .await
            .with_context(|| format!("Failed to cancel job {job_id}"))?;
        println!("Cancellation requested for {job_id}");
        return Ok(());
    }

    let channel = JobChannel::new(config.channel_config());
    let mut subscription = channel.watch_job(job_id).await?;
    channel.cancel_job(job_id)?;

    let confirmed = tokio::time::timeout(CONFIRM_TIMEOUT, async {
        while let Some(update) = subscription.next().await {
            if update.status.is_terminal() {
                return Some(update.status);
            }
        }
        None
    })
    .await
    .ok()
    .flatten();

    subscription.unsubscribe();
    channel.shutdown().await;

    match confirmed {
        Some(JobStatus::Cancelled) => println!("Job {job_id} cancelled"),
        Some(status) => println!("Job {job_id} already {status}"),
        None => println!(
            "Cancellation sent for {job_id}; no confirmation within {}s",
            CONFIRM_TIMEOUT.as_secs()
        ),
    }
    Ok(())
}
