use cadlink_mux::MuxError;

use crate::notifier::NotifierState;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum NotifyError {
    /// `start` is only valid from [`NotifierState::Inactive`].
    #[error("notifier {name} is already {state}")]
    AlreadyActive { name: String, state: NotifierState },

    /// The source's setup or teardown failed.
    #[error("event source failed: {message}")]
    Source { message: String },

    #[error(transparent)]
    Connection(#[from] MuxError),
}

impl NotifyError {
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self::Source { message: message.into() }
    }
}
