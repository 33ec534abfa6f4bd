use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cadlink_events::StandardEvent;

/// Receives every event a notifier emits.
///
/// Called synchronously on the notifier's consumption task; slow handlers delay delivery of
/// the next event.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &StandardEvent) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&StandardEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &StandardEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Registration token returned by `Notifier::add_event_handler`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Entry = (HandlerId, Arc<dyn EventHandler>);

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<Entry>>,
}

impl HandlerRegistry {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(&self, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Delivers `event` to a snapshot of the registry, in registration order.
    ///
    /// `keep_going` is checked before each handler so a stopping notifier delivers no further.
    pub(crate) fn dispatch(
        &self,
        notifier: &str,
        event: &StandardEvent,
        keep_going: impl Fn() -> bool,
    ) {
        let snapshot: Vec<Entry> =
            self.entries().iter().map(|(id, handler)| (*id, Arc::clone(handler))).collect();
        for (id, handler) in snapshot {
            if !keep_going() {
                return;
            }
            match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::error!(
                    "{notifier}: handler {id:?} failed on {}: {err:#}",
                    event.full_event_type()
                ),
                Err(panic) => log::error!(
                    "{notifier}: handler {id:?} panicked on {}: {}",
                    event.full_event_type(),
                    panic_message(panic.as_ref())
                ),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
