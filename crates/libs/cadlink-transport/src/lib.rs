//! Transport selection for the cadlink serving loop.
//!
//! [`TransportConfig`] says how the server talks to its clients: over stdio, which cannot push
//! anything unsolicited, or over a network transport that can deliver notifications.
//! [`TransportManager`] applies that choice to a [`Server`], runs the registered startup
//! callbacks and serves until the server returns or the process is interrupted.

pub mod config;
pub mod error;
pub mod kind;
mod manager;
pub mod server;

pub use config::{StartupParams, TransportConfig};
pub use error::{ServeError, TransportError};
pub use kind::TransportKind;
pub use manager::{CallbackId, TransportManager};
pub use server::{Server, StartupCallback};
