use super::Args;
use anyhow::Context;
use cadlink_daemon::commands::Command;
use cadlink_daemon::config::{DaemonConfig, TransportSection};
use cadlink_daemon::events::{DaemonEventSource, EventForwarder, StartNotifier, NOTIFIER_NAME};
use cadlink_daemon::server::LineServer;
use cadlink_mux::Multiplexer;
use cadlink_notify::Notifier;
use cadlink_transport::TransportManager;
use std::sync::Arc;
use std::time::Duration;

const DEMO_EVENT_INTERVAL: Duration = Duration::from_secs(2);

pub(super) async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = DaemonConfig::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("failed to load config {}", path.display()),
        None => "failed to load config".to_string(),
    })?;
    if let Some(host) = args.cad_host.clone() {
        config.cad.host = host;
    }
    if let Some(port) = args.cad_port {
        config.cad.port = port;
    }
    let cli_transport = TransportSection {
        kind: args.transport.clone(),
        host: args.listen_host.clone(),
        port: args.listen_port,
    };
    let transport = config.resolve_transport(&cli_transport)?;

    let mux = Arc::new(Multiplexer::new(config.cad.clone()));
    match mux.connect().await {
        Ok(()) => {
            log::info!("connected to CAD application at {}", mux.config().address());
            match Command::get_document_info().send(&mux).await {
                Ok(_) => log::info!("CAD application answered the document info probe"),
                Err(err) => log::warn!("document info probe failed: {err}"),
            }
        }
        Err(err) => {
            log::warn!("could not connect to CAD application at {}: {err}", mux.config().address());
            log::warn!("make sure the CAD plugin is running");
        }
    }

    let source = if args.demo_events {
        DaemonEventSource::demo(DEMO_EVENT_INTERVAL)
    } else {
        DaemonEventSource::connection(Arc::clone(&mux))
    };
    let notifier = Arc::new(Notifier::new(NOTIFIER_NAME, source));

    let mut server = LineServer::new(Arc::clone(&mux));
    let mut manager = TransportManager::new(transport);
    let pushes = manager.supports_notifications().then(|| server.push_sender());
    notifier.add_shared_handler(Arc::new(EventForwarder::new(pushes)));
    manager.add_startup_callback(StartNotifier::new(Arc::clone(&notifier)));

    let outcome = manager.run(&mut server).await;

    notifier.stop().await;
    mux.disconnect().await;
    log::info!("cadlinkd stopped");
    outcome.map_err(Into::into)
}
