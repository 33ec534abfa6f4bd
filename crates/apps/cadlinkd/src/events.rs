use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use cadlink_events::known::rhino;
use cadlink_events::{EventCategory, JsonMap, StandardEvent};
use cadlink_mux::{Multiplexer, WIRE_LOG_TARGET};
use cadlink_notify::{
    ConnectionEventSource, EventHandler, EventSource, Notifier, NotifyError, ScriptedEventSource,
};
use cadlink_transport::{StartupCallback, TransportConfig};
use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast;

use crate::server::LineServer;

pub const NOTIFIER_NAME: &str = "CadNotifier";

/// The event source the daemon runs: the live connection or a paced demo script.
pub enum DaemonEventSource {
    Connection(ConnectionEventSource),
    Demo(ScriptedEventSource),
}

impl DaemonEventSource {
    pub fn connection(mux: Arc<Multiplexer>) -> Self {
        Self::Connection(ConnectionEventSource::new(mux))
    }

    pub fn demo(interval: Duration) -> Self {
        Self::Demo(ScriptedEventSource::new(demo_script()).with_interval(interval).repeating())
    }
}

#[async_trait]
impl EventSource for DaemonEventSource {
    async fn start_monitoring(&mut self) -> Result<(), NotifyError> {
        match self {
            Self::Connection(source) => source.start_monitoring().await,
            Self::Demo(source) => source.start_monitoring().await,
        }
    }

    async fn stop_monitoring(&mut self) -> Result<(), NotifyError> {
        match self {
            Self::Connection(source) => source.stop_monitoring().await,
            Self::Demo(source) => source.stop_monitoring().await,
        }
    }

    async fn next_event(&mut self) -> Option<Result<StandardEvent, NotifyError>> {
        match self {
            Self::Connection(source) => source.next_event().await,
            Self::Demo(source) => source.next_event().await,
        }
    }
}

fn demo_script() -> Vec<StandardEvent> {
    fn data(value: JsonValue) -> JsonMap {
        match value {
            JsonValue::Object(map) => map,
            _ => JsonMap::new(),
        }
    }
    vec![
        StandardEvent::standard(
            EventCategory::Geometry,
            "created",
            data(json!({ "object_type": "BOX", "name": "demo-box" })),
        ),
        StandardEvent::standard(
            EventCategory::Layer,
            "changed",
            data(json!({ "layer": "Default", "property": "color" })),
        ),
        StandardEvent::standard(EventCategory::Selection, "changed", data(json!({ "count": 1 }))),
        StandardEvent::custom(rhino::MESH_CREATED, data(json!({ "vertices": 8 }))),
    ]
}

/// Event line pushed to network clients: the flat log form tagged `"type": "event"`.
pub fn event_line(event: &StandardEvent) -> String {
    let mut map = event.to_log_map();
    map.insert("type".into(), JsonValue::String("event".into()));
    JsonValue::Object(map).to_string()
}

/// Logs every event on the wire target and, when a push channel is given, forwards it to the
/// connected clients.
pub struct EventForwarder {
    pushes: Option<broadcast::Sender<String>>,
}

impl EventForwarder {
    pub fn new(pushes: Option<broadcast::Sender<String>>) -> Self {
        Self { pushes }
    }
}

impl EventHandler for EventForwarder {
    fn handle(&self, event: &StandardEvent) -> anyhow::Result<()> {
        let line = event_line(event);
        log::info!(target: WIRE_LOG_TARGET, "event {}: {line}", event.full_event_type());
        if let Some(pushes) = &self.pushes {
            // No connected client is not a failure.
            let _ = pushes.send(line);
        }
        Ok(())
    }
}

/// Starts the notifier once the transport is configured.
pub struct StartNotifier {
    notifier: Arc<Notifier<DaemonEventSource>>,
}

impl StartNotifier {
    pub fn new(notifier: Arc<Notifier<DaemonEventSource>>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl StartupCallback<LineServer> for StartNotifier {
    async fn on_startup(&self, _server: &mut LineServer, config: &TransportConfig) -> anyhow::Result<()> {
        self.notifier
            .start()
            .await
            .with_context(|| format!("starting notifier {}", self.notifier.name()))?;
        if config.supports_notifications() {
            log::info!("events are pushed to clients over {}", config.kind());
        } else {
            log::info!("events are logged only");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_line_is_tagged_and_flat() {
        let event = StandardEvent::standard(
            EventCategory::Layer,
            "deleted",
            demo_script()[1].data().clone(),
        )
        .stamped("CadNotifier", "s-1");
        let line: JsonValue = serde_json::from_str(&event_line(&event)).expect("json");
        assert_eq!(line["type"], "event");
        assert_eq!(line["event_type"], "layer.deleted");
        assert_eq!(line["session_id"], "s-1");
        assert_eq!(line["layer"], "Default");
    }

    #[test]
    fn forwarder_pushes_only_when_enabled() {
        let (pushes, mut received) = broadcast::channel(4);
        let event = demo_script().remove(0);
        EventForwarder::new(Some(pushes)).handle(&event).expect("handled");
        assert!(received.try_recv().expect("pushed").contains("geometry.created"));

        EventForwarder::new(None).handle(&event).expect("log only");
    }
}
