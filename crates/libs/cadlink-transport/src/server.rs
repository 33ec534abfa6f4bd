use async_trait::async_trait;

use crate::config::{StartupParams, TransportConfig};
use crate::error::ServeError;

/// A serving loop that can run over any [`TransportKind`](crate::TransportKind).
#[async_trait]
pub trait Server: Send + 'static {
    /// Adopts the transport choice before serving starts.
    fn apply_transport(&mut self, config: &TransportConfig);

    /// Serves until the clients are gone or the loop fails. `params` is
    /// [`TransportConfig::startup_params`].
    async fn serve(&mut self, params: &StartupParams) -> Result<(), ServeError>;
}

/// Hook run by [`TransportManager::configure`](crate::TransportManager::configure) after
/// the transport has been applied.
///
/// Plain closures `Fn(&mut S, &TransportConfig) -> anyhow::Result<()>` implement this trait;
/// implement it directly for hooks that need to await.
#[async_trait]
pub trait StartupCallback<S: Send + 'static>: Send + Sync {
    async fn on_startup(&self, server: &mut S, config: &TransportConfig) -> anyhow::Result<()>;
}

#[async_trait]
impl<S, F> StartupCallback<S> for F
where
    S: Send + 'static,
    F: Fn(&mut S, &TransportConfig) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_startup(&self, server: &mut S, config: &TransportConfig) -> anyhow::Result<()> {
        self(server, config)
    }
}
