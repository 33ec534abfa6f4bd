use async_trait::async_trait;
use cadlink_events::StandardEvent;

use crate::error::NotifyError;

/// A producer of [`StandardEvent`]s for one application.
///
/// `next_event` is polled inside a `select!` against the notifier's cancellation token, so it
/// must be cancel safe: dropping the future between events must not lose one.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Connects, subscribes or installs listeners. A failure aborts `Notifier::start`.
    async fn start_monitoring(&mut self) -> Result<(), NotifyError>;

    /// Releases what `start_monitoring` acquired.
    async fn stop_monitoring(&mut self) -> Result<(), NotifyError>;

    /// The next detected event. `None` ends the sequence; an error ends the consumption loop.
    async fn next_event(&mut self) -> Option<Result<StandardEvent, NotifyError>>;
}
