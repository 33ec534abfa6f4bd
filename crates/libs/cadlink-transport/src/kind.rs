use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Standard input/output of the process.
    #[serde(rename = "stdio")]
    Stdio,
    /// Server-sent events.
    #[serde(rename = "sse")]
    Sse,
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "streamable-http")]
    StreamableHttp,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [Self::Stdio, Self::Sse, Self::Http, Self::StreamableHttp];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Http => "http",
            Self::StreamableHttp => "streamable-http",
        }
    }

    /// Network transports can push unsolicited messages; stdio only answers requests.
    pub fn supports_notifications(self) -> bool {
        !matches!(self, Self::Stdio)
    }

    pub fn is_network(self) -> bool {
        self != Self::Stdio
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; surrounding whitespace is ignored.
impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| TransportError::UnknownTransport { value: value.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names_case_insensitively() {
        assert_eq!("STDIO".parse::<TransportKind>().ok(), Some(TransportKind::Stdio));
        assert_eq!(" sse ".parse::<TransportKind>().ok(), Some(TransportKind::Sse));
        assert_eq!(
            "Streamable-HTTP".parse::<TransportKind>().ok(),
            Some(TransportKind::StreamableHttp)
        );
        assert!(matches!(
            "websocket".parse::<TransportKind>(),
            Err(TransportError::UnknownTransport { value }) if value == "websocket"
        ));
    }

    #[test]
    fn only_stdio_lacks_notifications() {
        for kind in TransportKind::ALL {
            assert_eq!(kind.supports_notifications(), kind != TransportKind::Stdio);
        }
    }
}
