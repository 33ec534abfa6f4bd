/// Errors raised while reconstructing events from their serialised forms.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EventError {
    #[error("missing field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid field {field}: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("unknown event category: {value}")]
    UnknownCategory { value: String },

    #[error("invalid event json: {message}")]
    InvalidJson { message: String },
}

impl EventError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField { field, message: message.into() }
    }
}
