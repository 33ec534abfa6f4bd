//! Process wiring for `cadlinkd`: configuration, the line-oriented serving loops and typed
//! callers for the remote application's command set.

pub mod commands;
pub mod config;
pub mod events;
pub mod protocol;
pub mod server;
