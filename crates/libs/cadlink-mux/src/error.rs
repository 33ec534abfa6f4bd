use std::time::Duration;

/// Failure kinds of multiplexer operations.
///
/// `Clone` so one connection failure can be delivered to every outstanding request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MuxError {
    /// Socket absent, closed or reset. The connection is invalidated.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// No response in time. The remote may still complete the command.
    #[error("timeout after {timeout:?} waiting for {command_type}")]
    Timeout { command_type: String, timeout: Duration },

    /// The remote application reported failure for this request.
    #[error("remote error: {message}")]
    Remote { message: String },

    /// Malformed or undecodable frame.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl MuxError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote { message: message.into() }
    }

    /// Returns `true` when a fresh attempt may succeed. A timed-out command may already have
    /// run remotely, so retrying it is the caller's decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Short stable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
            Self::Remote { .. } => "remote",
            Self::Protocol { .. } => "protocol",
        }
    }
}

impl From<std::io::Error> for MuxError {
    fn from(err: std::io::Error) -> Self {
        Self::connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_variants() {
        assert!(MuxError::connection("reset").is_retryable());
        assert!(MuxError::Timeout { command_type: "x".into(), timeout: Duration::from_secs(1) }
            .is_retryable());
        assert!(!MuxError::remote("no such layer").is_retryable());
        assert!(!MuxError::protocol("garbage").is_retryable());
    }

    #[test]
    fn io_errors_become_connection_errors() {
        let err: MuxError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset").into();
        assert_eq!(err.kind(), "connection");
    }
}
