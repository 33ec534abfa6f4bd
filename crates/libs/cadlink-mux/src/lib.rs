//! Command/event multiplexer for a single persistent connection to a CAD application.
//!
//! The remote application speaks bare JSON over TCP. Requests carry a correlation id and are
//! answered out of order; between the answers the remote pushes unsolicited events. The
//! [`Multiplexer`] owns the socket and a background receive loop that tells the two apart:
//!
//! - **responses** (`request_id` matches a pending request) complete the waiting
//!   [`Multiplexer::send_command`] call;
//! - **events** (`"type": "event"`) are attributed to a recent command or to the user with
//!   [`attribution::CommandWindow`] and broadcast to [`Multiplexer::subscribe`]rs;
//! - anything else is logged and dropped.

pub mod attribution;
pub mod config;
pub mod error;
pub mod framing;
mod multiplexer;
pub mod request_id;
pub mod wire;

pub use attribution::{CommandContext, CommandWindow};
pub use config::MuxConfig;
pub use error::MuxError;
pub use multiplexer::Multiplexer;

/// Log target for raw frames in both directions.
pub const WIRE_LOG_TARGET: &str = "cadlink::wire";
