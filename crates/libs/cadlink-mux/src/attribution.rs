//! Time-window attribution of unsolicited events to recently issued commands.
//!
//! The remote never says which command caused an event. An event that arrives while some
//! command issued within the last `window` is still unanswered is reported as triggered by
//! that command (the most recently issued one when several qualify); otherwise it is
//! reported as a user action. Concurrent commands make this ambiguous, which is why the
//! result is only a hint.

use std::time::Duration;

use cadlink_events::EventOrigin;
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub request_id: String,
    pub command_type: String,
    pub issued_at: Instant,
}

/// Live command contexts, kept in issue order.
#[derive(Debug)]
pub struct CommandWindow {
    window: Duration,
    contexts: Vec<CommandContext>,
}

impl CommandWindow {
    pub fn new(window: Duration) -> Self {
        Self { window, contexts: Vec::new() }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn record(&mut self, request_id: impl Into<String>, command_type: impl Into<String>, now: Instant) {
        self.prune(now);
        self.contexts.push(CommandContext {
            request_id: request_id.into(),
            command_type: command_type.into(),
            issued_at: now,
        });
    }

    /// Drops the context of an answered or abandoned request. Returns whether one existed.
    pub fn complete(&mut self, request_id: &str) -> bool {
        let before = self.contexts.len();
        self.contexts.retain(|context| context.request_id != request_id);
        self.contexts.len() != before
    }

    /// Drops contexts whose window has elapsed at `now`.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.contexts.retain(|context| now.saturating_duration_since(context.issued_at) < window);
    }

    pub fn attribute_at(&mut self, now: Instant) -> EventOrigin {
        self.prune(now);
        match self.contexts.last() {
            Some(context) => EventOrigin::Command {
                request_id: context.request_id.clone(),
                command_type: context.command_type.clone(),
            },
            None => EventOrigin::User,
        }
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
