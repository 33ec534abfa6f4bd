use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadlink_mux::Multiplexer;
use cadlink_transport::config::{DEFAULT_HOST, DEFAULT_PORT};
use cadlink_transport::{ServeError, Server, StartupParams, TransportConfig, TransportKind};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};

use crate::commands::Command;
use crate::protocol::{self, Request};

/// Outgoing event lines buffered per connected client.
const PUSH_CAPACITY: usize = 256;

/// Pause after a failed accept, so a persistent error such as fd exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serves the line protocol over stdio or TCP, forwarding each request to the multiplexer.
pub struct LineServer {
    mux: Arc<Multiplexer>,
    kind: TransportKind,
    pushes: broadcast::Sender<String>,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl LineServer {
    pub fn new(mux: Arc<Multiplexer>) -> Self {
        let (pushes, _) = broadcast::channel(PUSH_CAPACITY);
        let (bound, _) = watch::channel(None);
        Self { mux, kind: TransportKind::Stdio, pushes, bound }
    }

    pub fn mux(&self) -> &Arc<Multiplexer> {
        &self.mux
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Sender for event lines delivered to every connected network client.
    pub fn push_sender(&self) -> broadcast::Sender<String> {
        self.pushes.clone()
    }

    /// Reports the listening address once a network transport is bound.
    pub fn bound_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.bound.subscribe()
    }

    async fn serve_network(&self, params: &StartupParams) -> Result<(), ServeError> {
        let host = params.get("host").and_then(JsonValue::as_str).unwrap_or(DEFAULT_HOST);
        let port = params
            .get("port")
            .and_then(JsonValue::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_PORT);
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|err| ServeError::failed(format!("cannot listen on {host}:{port}: {err}")))?;
        let local = listener.local_addr()?;
        log::info!("cadlinkd listening on {local} ({})", self.kind);
        self.bound.send_replace(Some(local));

        self.accept_clients(listener, local).await
    }

    async fn accept_clients<A: Accept>(&self, mut listener: A, local: SocketAddr) -> Result<(), ServeError> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(client) => client,
                Err(err) => {
                    log::warn!("accept on {local} failed: {err}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            log::info!("client connected: {peer}");
            let mux = Arc::clone(&self.mux);
            let pushes = self.kind.supports_notifications().then(|| self.pushes.subscribe());
            tokio::spawn(async move {
                let (reader, writer) = tokio::io::split(stream);
                match serve_connection(reader, writer, mux, pushes).await {
                    Ok(()) => log::info!("client disconnected: {peer}"),
                    Err(err) => log::warn!("client {peer} dropped: {err}"),
                }
            });
        }
    }
}

/// Source of incoming client streams.
#[async_trait]
trait Accept: Send {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(&*self).await
    }
}

#[async_trait]
impl Server for LineServer {
    fn apply_transport(&mut self, config: &TransportConfig) {
        self.kind = config.kind();
    }

    async fn serve(&mut self, params: &StartupParams) -> Result<(), ServeError> {
        if self.kind.is_network() {
            return self.serve_network(params).await;
        }
        log::info!("serving requests on stdio");
        serve_connection(tokio::io::stdin(), tokio::io::stdout(), Arc::clone(&self.mux), None)
            .await?;
        log::info!("stdin closed");
        Ok(())
    }
}

/// Runs one client session until its input ends and every started request has been answered.
///
/// Requests run concurrently, so replies may come back out of order. Event lines from
/// `pushes` are interleaved between replies.
pub async fn serve_connection<R, W>(
    reader: R,
    mut writer: W,
    mux: Arc<Multiplexer>,
    mut pushes: Option<broadcast::Receiver<String>>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();
    let mut reply_tx = Some(reply_tx);

    loop {
        tokio::select! {
            line = lines.next_line(), if reply_tx.is_some() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Some(tx) = &reply_tx {
                        tokio::spawn(answer(line, Arc::clone(&mux), tx.clone()));
                    }
                }
                None => reply_tx = None,
            },
            reply = replies.recv() => match reply {
                Some(reply) => write_line(&mut writer, &reply).await?,
                None => break,
            },
            push = next_push(&mut pushes) => match push {
                Some(line) => write_line(&mut writer, &line).await?,
                None => pushes = None,
            },
        }
    }
    writer.shutdown().await
}

async fn answer(line: String, mux: Arc<Multiplexer>, replies: mpsc::UnboundedSender<String>) {
    let reply = match Request::parse(&line) {
        Ok(request) => match Command::from_request(&request.command, &request.params) {
            Err(err) => {
                log::warn!("{err}");
                protocol::error_reply(&request.id, protocol::INVALID_PARAMS, &err.to_string())
            }
            Ok(command) => {
                let outcome = match command {
                    Some(command) => command.send(&mux).await,
                    None => mux.send_command(&request.command, request.params).await,
                };
                if let Err(err) = &outcome {
                    log::warn!("command {} failed: {err}", request.command);
                }
                protocol::reply(&request.id, outcome)
            }
        },
        Err(reply) => reply,
    };
    let _ = replies.send(reply.to_string());
}

async fn next_push(pushes: &mut Option<broadcast::Receiver<String>>) -> Option<String> {
    let Some(events) = pushes.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match events.recv().await {
            Ok(line) => return Some(line),
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("client too slow; {skipped} event(s) not delivered");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
