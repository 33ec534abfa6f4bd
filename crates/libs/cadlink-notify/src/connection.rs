use std::sync::Arc;

use async_trait::async_trait;
use cadlink_events::StandardEvent;
use cadlink_mux::Multiplexer;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::NotifyError;
use crate::source::EventSource;

/// Events pushed by the remote application over a shared [`Multiplexer`].
///
/// The subscription outlives individual connections, so monitoring may start before the
/// remote is reachable and picks up events from whichever connection is established later.
/// Stopping releases the subscription only; the connection stays with its owner.
pub struct ConnectionEventSource {
    mux: Arc<Multiplexer>,
    events: Option<broadcast::Receiver<StandardEvent>>,
}

impl ConnectionEventSource {
    pub fn new(mux: Arc<Multiplexer>) -> Self {
        Self { mux, events: None }
    }
}

#[async_trait]
impl EventSource for ConnectionEventSource {
    async fn start_monitoring(&mut self) -> Result<(), NotifyError> {
        self.events = Some(self.mux.subscribe());
        if let Err(err) = self.mux.connect().await {
            log::warn!(
                "remote application at {} not reachable yet ({err}); waiting for a later connection",
                self.mux.config().address()
            );
        }
        Ok(())
    }

    async fn stop_monitoring(&mut self) -> Result<(), NotifyError> {
        self.events = None;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<StandardEvent, NotifyError>> {
        let events = self.events.as_mut()?;
        loop {
            match events.recv().await {
                Ok(event) => return Some(Ok(event)),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("event consumer lagged; {skipped} event(s) skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
