use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use cadlink_events::StandardEvent;

use crate::error::NotifyError;
use crate::source::EventSource;

/// Replays a fixed list of events, optionally pacing them.
///
/// Stands in for a live application in tests and demos. Restarting replays the list from the
/// beginning.
#[derive(Debug, Clone)]
pub struct ScriptedEventSource {
    script: Vec<StandardEvent>,
    interval: Option<Duration>,
    remaining: VecDeque<StandardEvent>,
    fail_start: Option<String>,
    repeat: bool,
}

impl ScriptedEventSource {
    pub fn new(script: Vec<StandardEvent>) -> Self {
        Self {
            script,
            interval: None,
            remaining: VecDeque::new(),
            fail_start: None,
            repeat: false,
        }
    }

    /// Waits `interval` before yielding each event.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Starts over once the list is exhausted instead of ending the sequence.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Makes `start_monitoring` fail with `message`.
    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.fail_start = Some(message.into());
        self
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn start_monitoring(&mut self) -> Result<(), NotifyError> {
        if let Some(message) = &self.fail_start {
            return Err(NotifyError::source_failure(message.clone()));
        }
        self.remaining = self.script.iter().cloned().collect();
        Ok(())
    }

    async fn stop_monitoring(&mut self) -> Result<(), NotifyError> {
        self.remaining.clear();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<StandardEvent, NotifyError>> {
        if self.remaining.is_empty() {
            if !self.repeat || self.script.is_empty() {
                return None;
            }
            tokio::task::yield_now().await;
            self.remaining = self.script.iter().cloned().collect();
        }
        if let Some(interval) = self.interval {
            tokio::time::sleep(interval).await;
        }
        self.remaining.pop_front().map(Ok)
    }
}
