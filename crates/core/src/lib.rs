//! Domain types and pure logic for the TellMeMo client.
//!
//! Nothing in this crate performs I/O. The job state machine, the bulk
//! invite parser, and the list helpers are shared by the client library
//! and the CLI.

pub mod bulk_invite;
pub mod error;
pub mod job;
pub mod recent;
pub mod roles;
pub mod summaries;
pub mod tasks;
pub mod types;
