//! TellMeMo job channel and REST client library.
//!
//! Provides the WebSocket job-status channel (connection management,
//! typed wire messages, reconnection with backoff, reference-counted
//! subscriptions), the per-job tracker for callers awaiting one job,
//! a thin REST wrapper, and the sequential bulk-invite sender.

pub mod api;
pub mod channel;
pub mod client;
pub mod events;
pub mod invites;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod tracker;

pub use channel::{ChannelConfig, ChannelError, JobChannel, JobSubscription};
pub use events::{ChannelEvent, ConnectionState};
pub use tracker::{JobObserver, JobTracker, TerminalGuard, TerminalOutcome};
