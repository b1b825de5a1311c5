//! `tellmemo` -- command-line client for the TellMeMo backend.
//!
//! Follows and cancels background jobs over the job channel, sends bulk
//! organization invitations from CSV files, and lists project tasks and
//! summaries.
//!
//! # Environment variables
//!
//! | Variable                        | Required | Default                      | Description                         |
//! |---------------------------------|----------|------------------------------|-------------------------------------|
//! | `TELLMEMO_API_URL`              | no       | `http://localhost:8000`      | REST base URL                       |
//! | `TELLMEMO_WS_URL`               | no       | `ws://localhost:8000`        | WebSocket base URL                  |
//! | `TELLMEMO_TOKEN`                | no       | --                           | Bearer token                        |
//! | `TELLMEMO_CONNECT_TIMEOUT_SECS` | no       | `10`                         | Job channel connect timeout         |
//! | `TELLMEMO_HEARTBEAT_SECS`       | no       | `30`                         | Seconds between pings               |
//! | `TELLMEMO_DEFAULT_INVITE_ROLE`  | no       | `member`                     | Role for CSV rows without one       |
//! | `TELLMEMO_INVITE_DELAY_MS`      | no       | `300`                        | Pause between bulk invitations      |
//! | `TELLMEMO_PREFS_PATH`           | no       | `.tellmemo/preferences.json` | Saved list preferences              |

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tellmemo_cli::cli::{Cli, Command};
use tellmemo_cli::commands;
use tellmemo_cli::config::ClientConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tellmemo_cli=info,tellmemo_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::from_env()?.with_url_overrides(cli.api_url, cli.ws_url)?;

    match cli.command {
        Command::Watch { job_id, result_key } => {
            commands::watch::run(&config, &job_id, result_key).await
        }
        Command::Cancel { job_id, ws } => commands::cancel::run(&config, &job_id, ws).await,
        Command::Invite(args) => commands::invite::run(&config, &args).await,
        Command::Tasks(args) => commands::tasks::run(&config, &args).await,
        Command::Summaries(args) => commands::summaries::run(&config, &args).await,
    }
}
