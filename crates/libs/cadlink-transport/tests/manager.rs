use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadlink_transport::{
    ServeError, Server, StartupCallback, StartupParams, TransportConfig, TransportError,
    TransportKind, TransportManager,
};
use serde_json::json;

enum Behaviour {
    Return,
    Interrupt,
    Fail,
    Forever,
}

struct RecordingServer {
    behaviour: Behaviour,
    applied: Option<TransportKind>,
    served_with: Option<StartupParams>,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingServer {
    fn new(behaviour: Behaviour) -> Self {
        Self { behaviour, applied: None, served_with: None, log: Arc::default() }
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().expect("log").push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().expect("log").clone()
    }
}

#[async_trait]
impl Server for RecordingServer {
    fn apply_transport(&mut self, config: &TransportConfig) {
        self.applied = Some(config.kind());
        self.record("apply");
    }

    async fn serve(&mut self, params: &StartupParams) -> Result<(), ServeError> {
        self.served_with = Some(params.clone());
        self.record("serve");
        match self.behaviour {
            Behaviour::Return => Ok(()),
            Behaviour::Interrupt => Err(ServeError::Interrupted),
            Behaviour::Fail => Err(ServeError::failed("port already in use")),
            Behaviour::Forever => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

struct AsyncHook(&'static str);

#[async_trait]
impl StartupCallback<RecordingServer> for AsyncHook {
    async fn on_startup(
        &self,
        server: &mut RecordingServer,
        _config: &TransportConfig,
    ) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        server.record(self.0);
        Ok(())
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn configure_applies_transport_then_runs_callbacks_in_order() {
    init_logging();
    let mut manager = TransportManager::sse("localhost", 3000);
    manager.add_startup_callback(
        |server: &mut RecordingServer, config: &TransportConfig| -> anyhow::Result<()> {
            server.record(format!("first:{}", config.kind()));
            Ok(())
        },
    );
    manager.add_startup_callback(AsyncHook("second"));

    let mut server = RecordingServer::new(Behaviour::Return);
    manager.configure(&mut server).await;

    assert_eq!(server.applied, Some(TransportKind::Sse));
    assert_eq!(server.entries(), ["apply", "first:sse", "second"]);
}

#[tokio::test]
async fn failing_callback_does_not_abort_configuration() {
    init_logging();
    let mut manager = TransportManager::stdio();
    manager.add_startup_callback(
        |_: &mut RecordingServer, _: &TransportConfig| -> anyhow::Result<()> {
            anyhow::bail!("notifier could not start")
        },
    );
    manager.add_startup_callback(AsyncHook("after-failure"));

    let mut server = RecordingServer::new(Behaviour::Return);
    manager.configure(&mut server).await;
    assert_eq!(server.entries(), ["apply", "after-failure"]);
}

#[tokio::test]
async fn removed_callback_is_not_run() {
    let mut manager = TransportManager::stdio();
    let id = manager.add_startup_callback(AsyncHook("removed"));
    manager.add_startup_callback(AsyncHook("kept"));
    assert!(manager.remove_startup_callback(id));
    assert!(!manager.remove_startup_callback(id));

    let mut server = RecordingServer::new(Behaviour::Return);
    manager.configure(&mut server).await;
    assert_eq!(server.entries(), ["apply", "kept"]);
}

#[tokio::test]
async fn run_serves_with_startup_params() {
    init_logging();
    let manager = TransportManager::streamable_http("127.0.0.1", 2001);
    let mut server = RecordingServer::new(Behaviour::Return);
    manager.run(&mut server).await.expect("clean exit");

    let params = server.served_with.expect("served");
    assert_eq!(
        serde_json::Value::Object(params),
        json!({ "transport": "streamable-http", "host": "127.0.0.1", "port": 2001 })
    );
    assert!(manager.supports_notifications());
}

#[tokio::test]
async fn stdio_serves_with_empty_params() {
    let manager = TransportManager::stdio();
    let mut server = RecordingServer::new(Behaviour::Return);
    manager.run(&mut server).await.expect("clean exit");
    assert_eq!(server.served_with, Some(StartupParams::new()));
    assert!(!manager.supports_notifications());
}

#[tokio::test]
async fn interrupt_is_a_clean_shutdown() {
    let manager = TransportManager::stdio();
    let mut server = RecordingServer::new(Behaviour::Interrupt);
    manager.run(&mut server).await.expect("interrupt is not an error");
}

#[tokio::test]
async fn shutdown_signal_stops_a_running_server() {
    let manager = TransportManager::sse("127.0.0.1", 2001);
    let mut server = RecordingServer::new(Behaviour::Forever);
    let shutdown = tokio::time::sleep(Duration::from_millis(20));
    tokio::time::timeout(Duration::from_secs(2), manager.run_until(&mut server, shutdown))
        .await
        .expect("stopped in time")
        .expect("clean exit");
    assert_eq!(server.entries(), ["apply", "serve"]);
}

#[tokio::test]
async fn serving_fault_is_returned() {
    init_logging();
    let manager = TransportManager::sse("127.0.0.1", 2001);
    let mut server = RecordingServer::new(Behaviour::Fail);
    let err = manager.run(&mut server).await.expect_err("fault");
    assert!(matches!(err, TransportError::Serve(ServeError::Failed { .. })));
}

#[test]
fn create_checks_explicit_transport_names() {
    let manager = TransportManager::<RecordingServer>::create(
        Some("SSE"),
        Some("0.0.0.0".into()),
        Some(8080),
    )
    .expect("known transport");
    assert_eq!(manager.config().to_string(), "SSE on 0.0.0.0:8080");

    let err = TransportManager::<RecordingServer>::create(Some("invalid"), None, None)
        .err()
        .expect("unknown transport");
    assert!(matches!(err, TransportError::UnknownTransport { ref value } if value == "invalid"));
}
