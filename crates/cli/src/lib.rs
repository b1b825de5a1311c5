//! TellMeMo command-line client.
//!
//! Configuration, local preferences, and the `watch`, `cancel`,
//! `invite`, `tasks`, and `summaries` commands built on
//! [`tellmemo_client`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod preferences;
