use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cadlink_events::{EventCategory, JsonMap, StandardEvent};
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::NotifyError;
use crate::handler::{EventHandler, HandlerId, HandlerRegistry};
use crate::source::EventSource;

/// Bound on how long `stop` waits for the consumption loop before aborting it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotifierState {
    Inactive,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for NotifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inactive => "inactive",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
        })
    }
}

/// Lifecycle driver for one [`EventSource`].
///
/// `Inactive -> Starting -> Active -> Stopping -> Inactive`. All methods take `&self`, so a
/// notifier is usually shared as `Arc<Notifier<S>>` between the code that starts it and the
/// code that stops it.
pub struct Notifier<S: EventSource> {
    name: String,
    session_id: String,
    stop_timeout: Duration,
    handlers: Arc<HandlerRegistry>,
    state: Mutex<NotifierState>,
    source: Arc<tokio::sync::Mutex<S>>,
    // Serialises start and stop; holds the running loop.
    run: tokio::sync::Mutex<Option<Run>>,
}

struct Run {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<S: EventSource> Notifier<S> {
    pub fn new(name: impl Into<String>, source: S) -> Self {
        let name = name.into();
        let session_id = default_session_id(&name, OffsetDateTime::now_utc());
        Self {
            name,
            session_id,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            handlers: Arc::new(HandlerRegistry::default()),
            state: Mutex::new(NotifierState::Inactive),
            source: Arc::new(tokio::sync::Mutex::new(source)),
            run: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> NotifierState {
        *self.lock_state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == NotifierState::Active
    }

    fn lock_state(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: NotifierState) {
        *self.lock_state() = state;
    }

    /// Runs the source's setup and launches the consumption loop.
    ///
    /// Fails with [`NotifyError::AlreadyActive`] unless the notifier is inactive. When the
    /// setup fails the notifier returns to inactive and the setup error is returned.
    pub async fn start(&self) -> Result<(), NotifyError> {
        let mut run = self.run.lock().await;
        {
            let mut state = self.lock_state();
            if *state != NotifierState::Inactive {
                log::warn!("notifier {} is already {}", self.name, *state);
                return Err(NotifyError::AlreadyActive { name: self.name.clone(), state: *state });
            }
            *state = NotifierState::Starting;
        }
        log::info!("starting notifier {}", self.name);

        let started = match self.source.try_lock() {
            Ok(mut source) => source.start_monitoring().await,
            Err(_) => Err(NotifyError::source_failure("event source is still busy")),
        };
        if let Err(err) = started {
            self.set_state(NotifierState::Inactive);
            log::error!("failed to start notifier {}: {err}", self.name);
            return Err(err);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume(
            Arc::clone(&self.source),
            cancel.clone(),
            self.emitter(),
        ));
        *run = Some(Run { cancel, task });
        self.set_state(NotifierState::Active);
        Ok(())
    }

    /// Stops the consumption loop, then runs the source's teardown.
    ///
    /// A no-op when inactive. Never fails: teardown errors are logged. Once this returns no
    /// handler is invoked by the loop again.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        {
            let mut state = self.lock_state();
            if *state != NotifierState::Active {
                return;
            }
            *state = NotifierState::Stopping;
        }
        log::info!("stopping notifier {}", self.name);

        if let Some(mut current) = run.take() {
            current.cancel.cancel();
            match tokio::time::timeout(self.stop_timeout, &mut current.task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::error!("notifier {} loop ended abnormally: {err}", self.name),
                Err(_) => {
                    log::warn!(
                        "notifier {} loop did not stop within {:?}; aborting it",
                        self.name,
                        self.stop_timeout
                    );
                    current.task.abort();
                    if let Err(err) = (&mut current.task).await {
                        if !err.is_cancelled() {
                            log::error!("notifier {} loop ended abnormally: {err}", self.name);
                        }
                    }
                }
            }
        }

        match self.source.try_lock() {
            Ok(mut source) => {
                if let Err(err) = source.stop_monitoring().await {
                    log::error!("error stopping monitoring for {}: {err}", self.name);
                }
            }
            Err(_) => log::error!("event source of {} is still busy; skipping teardown", self.name),
        }
        self.set_state(NotifierState::Inactive);
    }

    /// Stamps the notifier's identity onto `event` and delivers it to every handler.
    pub fn emit_event(&self, event: StandardEvent) {
        self.emitter().emit(event, || true);
    }

    /// Registers a closure handler. Changes apply from the next emitted event.
    pub fn add_event_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&StandardEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.add(Arc::new(handler))
    }

    /// Registers a shared handler object.
    pub fn add_shared_handler(&self, handler: Arc<dyn EventHandler>) -> HandlerId {
        self.handlers.add(handler)
    }

    /// Returns whether a handler was registered under `id`.
    pub fn remove_event_handler(&self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn create_standard_event(
        &self,
        category: EventCategory,
        action: impl Into<String>,
        data: JsonMap,
    ) -> StandardEvent {
        StandardEvent::standard(category, action, data)
    }

    pub fn create_custom_event(&self, event_type: impl Into<String>, data: JsonMap) -> StandardEvent {
        StandardEvent::custom(event_type, data)
    }

    fn emitter(&self) -> Emitter {
        Emitter {
            name: self.name.clone(),
            session_id: self.session_id.clone(),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<S: EventSource> Drop for Notifier<S> {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut() {
            run.cancel.cancel();
        }
    }
}

struct Emitter {
    name: String,
    session_id: String,
    handlers: Arc<HandlerRegistry>,
}

impl Emitter {
    fn emit(&self, event: StandardEvent, keep_going: impl Fn() -> bool) {
        let event = event.stamped(self.name.as_str(), self.session_id.as_str());
        log::debug!("{}: emitting {}", self.name, event.full_event_type());
        self.handlers.dispatch(&self.name, &event, keep_going);
    }
}

async fn consume<S: EventSource>(
    source: Arc<tokio::sync::Mutex<S>>,
    cancel: CancellationToken,
    emitter: Emitter,
) {
    let mut source = source.lock().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = source.next_event() => match next {
                Some(Ok(event)) => emitter.emit(event, || !cancel.is_cancelled()),
                Some(Err(err)) => {
                    log::error!("{}: event source failed: {err}", emitter.name);
                    break;
                }
                None => {
                    log::info!("{}: event source exhausted", emitter.name);
                    break;
                }
            },
        }
    }
}

fn default_session_id(name: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("{name}_{stamp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn session_id_embeds_name_and_start_time() {
        let now = datetime!(2025-03-07 09:05:01 UTC);
        assert_eq!(default_session_id("RhinoNotifier", now), "RhinoNotifier_20250307_090501");
    }

    #[test]
    fn state_names() {
        assert_eq!(NotifierState::Stopping.to_string(), "stopping");
        assert_eq!(NotifierState::Inactive.to_string(), "inactive");
    }
}
