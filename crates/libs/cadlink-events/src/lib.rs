//! Standardised event model for CAD application notifications.
//!
//! An event is one detected occurrence in the remote application: a layer was added, a
//! selection changed, a tool-specific operation finished. Events are categorised either by a
//! fixed, tool-neutral [`EventCategory`] or by a free-form dotted string such as
//! `"rhino.nurbs_surface_created"`; both forms are carried by [`EventType`].
//!
//! [`StandardEvent`] values are immutable once built. They serialise to a flat log form
//! (see [`StandardEvent::to_log_map`]) that reconstructs losslessly.

pub mod category;
pub mod error;
pub mod event;
pub mod known;

pub use category::{EventCategory, EventType};
pub use error::EventError;
pub use event::{EventOrigin, JsonMap, StandardEvent, NESTED_PAYLOAD_KEY, RESERVED_KEYS};
