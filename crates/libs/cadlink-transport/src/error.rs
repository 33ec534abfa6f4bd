#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("unknown transport type: {value}")]
    UnknownTransport { value: String },

    #[error("server error: {0}")]
    Serve(#[from] ServeError),
}

/// How a serving loop ended other than by returning normally.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServeError {
    /// Stopped on the operator's request. Treated as a clean shutdown.
    #[error("interrupted")]
    Interrupted,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Failed { message: String },
}

impl ServeError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { message: message.into() }
    }
}
