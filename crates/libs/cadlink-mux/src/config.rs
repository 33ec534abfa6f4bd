use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection and timing settings of one [`Multiplexer`](crate::Multiplexer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MuxConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long `send_command` waits for the matching response.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// How long after issue a command still claims incoming events.
    #[serde(default = "default_attribution_window_ms")]
    pub attribution_window_ms: u64,
    /// How long a partially received frame may stay incomplete.
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Buffered events per subscriber before slow subscribers start skipping.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1999
}

fn default_command_timeout_ms() -> u64 {
    15_000
}

fn default_attribution_window_ms() -> u64 {
    5_000
}

fn default_frame_timeout_ms() -> u64 {
    15_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_event_capacity() -> usize {
    256
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            command_timeout_ms: default_command_timeout_ms(),
            attribution_window_ms: default_attribution_window_ms(),
            frame_timeout_ms: default_frame_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl MuxConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_attribution_window(mut self, window: Duration) -> Self {
        self.attribution_window_ms = duration_ms(window);
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn attribution_window(&self) -> Duration {
        Duration::from_millis(self.attribution_window_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
