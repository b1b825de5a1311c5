//! Subcommand implementations. Each returns `anyhow::Result` so `main`
//! can print a single error line.

pub mod cancel;
pub mod invite;
pub mod summaries;
pub mod tasks;
pub mod watch;
