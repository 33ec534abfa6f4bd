use std::future::Future;
use std::sync::Arc;

use crate::config::TransportConfig;
use crate::error::{ServeError, TransportError};
use crate::kind::TransportKind;
use crate::server::{Server, StartupCallback};

/// Registration token returned by [`TransportManager::add_startup_callback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Applies one [`TransportConfig`] to a [`Server`] and runs it.
pub struct TransportManager<S: Server> {
    config: TransportConfig,
    callbacks: Vec<(CallbackId, Arc<dyn StartupCallback<S>>)>,
    next_callback: u64,
}

impl<S: Server> TransportManager<S> {
    pub fn new(config: TransportConfig) -> Self {
        Self { config, callbacks: Vec::new(), next_callback: 0 }
    }

    pub fn from_env() -> Self {
        Self::new(TransportConfig::from_env())
    }

    pub fn stdio() -> Self {
        Self::new(TransportConfig::stdio())
    }

    pub fn sse(host: impl Into<String>, port: u16) -> Self {
        Self::new(TransportConfig::network(TransportKind::Sse, host, port))
    }

    pub fn streamable_http(host: impl Into<String>, port: u16) -> Self {
        Self::new(TransportConfig::network(TransportKind::StreamableHttp, host, port))
    }

    /// Environment resolution when `kind` is `None`, otherwise the named transport with the
    /// given network parameters.
    pub fn create(
        kind: Option<&str>,
        host: Option<String>,
        port: Option<u16>,
    ) -> Result<Self, TransportError> {
        match kind {
            None => Ok(Self::from_env()),
            Some(kind) => TransportConfig::parse(kind, host, port).map(Self::new),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn kind(&self) -> TransportKind {
        self.config.kind()
    }

    pub fn supports_notifications(&self) -> bool {
        self.config.supports_notifications()
    }

    pub fn add_startup_callback(&mut self, callback: impl StartupCallback<S> + 'static) -> CallbackId {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        let callback: Arc<dyn StartupCallback<S>> = Arc::new(callback);
        self.callbacks.push((id, callback));
        id
    }

    /// Returns whether a callback was registered under `id`.
    pub fn remove_startup_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(entry, _)| *entry != id);
        self.callbacks.len() != before
    }

    /// Applies the transport to `server` and runs every startup callback in registration
    /// order. A failing callback is logged and the remaining ones still run.
    pub async fn configure(&self, server: &mut S) {
        log::info!("configuring server for transport: {}", self.config);
        if self.config.supports_notifications() {
            log::info!("transport supports real-time notifications");
        } else {
            log::warn!(
                "transport {} does not support real-time notifications; events will only be logged",
                self.config.kind()
            );
        }
        server.apply_transport(&self.config);

        for (id, callback) in &self.callbacks {
            if let Err(err) = callback.on_startup(server, &self.config).await {
                log::error!("startup callback {id:?} failed: {err:#}");
            }
        }
    }

    /// Configures and serves until the server returns or the process receives Ctrl-C.
    pub async fn run(&self, server: &mut S) -> Result<(), TransportError> {
        self.run_until(server, interrupted()).await
    }

    /// Configures and serves until the server returns or `shutdown` completes.
    ///
    /// A clean interrupt, from either side, is `Ok`. Any other serving fault is logged and
    /// returned.
    pub async fn run_until(
        &self,
        server: &mut S,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TransportError> {
        self.configure(server).await;

        let params = self.config.startup_params();
        log::info!("starting server with {}", self.config);
        if !params.is_empty() {
            log::info!("startup parameters: {}", serde_json::Value::Object(params.clone()));
        }

        let outcome = tokio::select! {
            outcome = server.serve(&params) => outcome,
            _ = shutdown => Err(ServeError::Interrupted),
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(ServeError::Interrupted) => {
                log::info!("server stopped by user");
                Ok(())
            }
            Err(err) => {
                log::error!("server error: {err}");
                Err(err.into())
            }
        }
    }
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("cannot listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}
