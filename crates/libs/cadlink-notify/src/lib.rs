//! Notifier lifecycle around pluggable CAD event sources.
//!
//! A [`Notifier`] drives one [`EventSource`]: it runs the source's setup, pulls events from it
//! on a background task, stamps each event with the notifier's identity and fans it out to
//! the registered [`EventHandler`]s.

pub mod connection;
pub mod error;
pub mod handler;
mod notifier;
pub mod scripted;
pub mod source;

pub use connection::ConnectionEventSource;
pub use error::NotifyError;
pub use handler::{EventHandler, HandlerId};
pub use notifier::{Notifier, NotifierState, DEFAULT_STOP_TIMEOUT};
pub use scripted::ScriptedEventSource;
pub use source::EventSource;
