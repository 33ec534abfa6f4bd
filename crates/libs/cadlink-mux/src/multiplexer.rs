use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cadlink_events::{JsonMap, StandardEvent};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::attribution::CommandWindow;
use crate::config::MuxConfig;
use crate::error::MuxError;
use crate::framing::FrameReader;
use crate::request_id;
use crate::wire::{self, CommandFrame, Inbound};
use crate::WIRE_LOG_TARGET;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;
type Completion = oneshot::Sender<Result<JsonValue, MuxError>>;

/// How long `disconnect` waits for the receive loop to wind down before aborting it.
const RECEIVE_LOOP_GRACE: Duration = Duration::from_secs(2);

/// Owner of the single connection to the remote application.
///
/// Any number of tasks may call [`send_command`](Self::send_command) concurrently; their
/// frames are written one at a time and their responses are matched back by correlation id
/// in whatever order the remote produces them.
pub struct Multiplexer {
    config: MuxConfig,
    link: tokio::sync::Mutex<Option<Link>>,
    shared: Arc<Shared>,
}

struct Shared {
    tables: Mutex<Tables>,
    events: broadcast::Sender<StandardEvent>,
    next_link_id: AtomicU64,
}

struct Tables {
    pending: HashMap<String, Pending>,
    contexts: CommandWindow,
}

struct Pending {
    link_id: u64,
    completion: Completion,
}

struct Link {
    id: u64,
    writer: SharedWriter,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

#[derive(Clone)]
struct LinkHandle {
    id: u64,
    writer: SharedWriter,
    cancel: CancellationToken,
}

impl Multiplexer {
    pub fn new(config: MuxConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let tables = Tables {
            pending: HashMap::new(),
            contexts: CommandWindow::new(config.attribution_window()),
        };
        Self {
            config,
            link: tokio::sync::Mutex::new(None),
            shared: Arc::new(Shared {
                tables: Mutex::new(tables),
                events,
                next_link_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Opens the TCP connection unless a live one exists.
    pub async fn connect(&self) -> Result<(), MuxError> {
        self.ensure_link().await.map(|_| ())
    }

    /// Binds an already established stream, replacing any current connection.
    pub async fn attach<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut link = self.link.lock().await;
        if let Some(previous) = link.take() {
            previous.shutdown(&self.shared).await;
        }
        *link = Some(self.spawn_link(stream));
    }

    /// Closes the connection. Every outstanding request fails with
    /// [`MuxError::Connection`] and all command contexts are dropped.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        if let Some(current) = link.take() {
            current.shutdown(&self.shared).await;
            log::info!("disconnected from remote application");
        }
        self.shared.tables().contexts.clear();
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.as_ref().is_some_and(Link::is_live)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.tables().pending.len()
    }

    pub fn context_count(&self) -> usize {
        self.shared.tables().contexts.len()
    }

    /// Unsolicited events of every connection this multiplexer will own, each tagged with
    /// its [`EventOrigin`](cadlink_events::EventOrigin).
    pub fn subscribe(&self) -> broadcast::Receiver<StandardEvent> {
        self.shared.events.subscribe()
    }

    pub async fn send_command(
        &self,
        command_type: &str,
        params: JsonValue,
    ) -> Result<JsonValue, MuxError> {
        self.send_command_with_timeout(command_type, params, self.config.command_timeout()).await
    }

    /// Sends one command and waits up to `timeout` for its response.
    ///
    /// Connects first when there is no live connection. A `null` params value is sent as
    /// an empty object.
    pub async fn send_command_with_timeout(
        &self,
        command_type: &str,
        params: JsonValue,
        timeout: Duration,
    ) -> Result<JsonValue, MuxError> {
        let link = self.ensure_link().await?;
        let params = if params.is_null() { JsonValue::Object(JsonMap::new()) } else { params };

        let (completion, response) = oneshot::channel();
        let request_id = {
            let mut tables = self.shared.tables();
            let request_id = request_id::generate_unique(|id| tables.pending.contains_key(id));
            tables.pending.insert(request_id.clone(), Pending { link_id: link.id, completion });
            tables.contexts.record(request_id.clone(), command_type, Instant::now());
            request_id
        };
        if link.cancel.is_cancelled() {
            self.shared.abandon(&request_id);
            return Err(MuxError::connection("connection closed"));
        }

        let frame = match (CommandFrame { command_type, params: &params, request_id: &request_id })
            .encode()
        {
            Ok(frame) => frame,
            Err(err) => {
                self.shared.abandon(&request_id);
                return Err(err);
            }
        };

        let exchange = async move {
            if let Err(err) = link.write(&frame).await {
                link.cancel.cancel();
                return Err(MuxError::connection(format!("send failed: {err}")));
            }
            response.await.unwrap_or_else(|_| {
                Err(MuxError::connection("connection closed before a response arrived"))
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => {
                self.shared.abandon(&request_id);
                Err(err)
            }
            Err(_) => {
                self.shared.abandon(&request_id);
                log::warn!("{command_type} ({request_id}) timed out after {timeout:?}");
                Err(MuxError::Timeout { command_type: command_type.to_string(), timeout })
            }
        }
    }

    async fn ensure_link(&self) -> Result<LinkHandle, MuxError> {
        let mut link = self.link.lock().await;
        if let Some(live) = link.as_ref().filter(|link| link.is_live()) {
            return Ok(live.handle());
        }
        if let Some(stale) = link.take() {
            stale.shutdown(&self.shared).await;
        }
        let stream = self.open_stream().await?;
        let fresh = self.spawn_link(stream);
        let handle = fresh.handle();
        *link = Some(fresh);
        Ok(handle)
    }

    async fn open_stream(&self) -> Result<TcpStream, MuxError> {
        let address = self.config.address();
        match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(&address))
            .await
        {
            Ok(Ok(stream)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    log::debug!("set_nodelay on {address} failed: {err}");
                }
                log::info!("connected to remote application at {address}");
                Ok(stream)
            }
            Ok(Err(err)) => {
                Err(MuxError::connection(format!("failed to connect to {address}: {err}")))
            }
            Err(_) => Err(MuxError::connection(format!("timed out connecting to {address}"))),
        }
    }

    fn spawn_link<S>(&self, stream: S) -> Link
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let id = self.shared.next_link_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let reader: BoxedReader = Box::new(read_half);
        let frames = FrameReader::new(reader, self.config.frame_timeout());
        let reader = tokio::spawn(receive_loop(frames, cancel.clone(), Arc::clone(&self.shared), id));
        Link {
            id,
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(write_half))),
            cancel,
            reader,
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut() {
            link.cancel.cancel();
        }
    }
}

impl Link {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.reader.is_finished()
    }

    fn handle(&self) -> LinkHandle {
        LinkHandle { id: self.id, writer: Arc::clone(&self.writer), cancel: self.cancel.clone() }
    }

    async fn shutdown(mut self, shared: &Shared) {
        self.cancel.cancel();
        if tokio::time::timeout(RECEIVE_LOOP_GRACE, &mut self.reader).await.is_err() {
            log::warn!("receive loop did not stop within {RECEIVE_LOOP_GRACE:?}; aborting it");
            self.reader.abort();
        }
        shared.fail_link(self.id, &MuxError::connection("disconnected"));
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            log::debug!("closing write half failed: {err}");
        }
    }
}

impl LinkHandle {
    async fn write(&self, frame: &[u8]) -> std::io::Result<()> {
        log::debug!(target: WIRE_LOG_TARGET, "-> {}", String::from_utf8_lossy(frame).trim_end());
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await
    }
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forgets a request the caller stopped waiting for.
    fn abandon(&self, request_id: &str) {
        let mut tables = self.tables();
        tables.pending.remove(request_id);
        tables.contexts.complete(request_id);
    }

    fn fail_link(&self, link_id: u64, reason: &MuxError) {
        let failed: Vec<(String, Pending)> = {
            let mut tables = self.tables();
            let ids: Vec<String> = tables
                .pending
                .iter()
                .filter(|(_, pending)| pending.link_id == link_id)
                .map(|(id, _)| id.clone())
                .collect();
            let mut failed = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(pending) = tables.pending.remove(&id) {
                    tables.contexts.complete(&id);
                    failed.push((id, pending));
                }
            }
            failed
        };
        if !failed.is_empty() {
            log::warn!("failing {} outstanding request(s): {reason}", failed.len());
        }
        for (_, pending) in failed {
            let _ = pending.completion.send(Err(reason.clone()));
        }
    }

    fn dispatch(&self, frame: JsonValue) {
        log::debug!(target: WIRE_LOG_TARGET, "<- {frame}");
        match wire::classify(frame) {
            Inbound::Response { request_id, outcome } => {
                let pending = {
                    let mut tables = self.tables();
                    let pending = tables.pending.remove(&request_id);
                    if pending.is_some() {
                        tables.contexts.complete(&request_id);
                    }
                    pending
                };
                match pending {
                    Some(pending) => {
                        let _ = pending.completion.send(outcome);
                    }
                    None => log::debug!("dropping response for unknown request {request_id}"),
                }
            }
            Inbound::Event(map) => match StandardEvent::from_wire(map) {
                Ok(event) => {
                    let origin = self.tables().contexts.attribute_at(Instant::now());
                    let _ = self.events.send(event.with_origin(origin));
                }
                Err(err) => log::warn!("dropping malformed event frame: {err}"),
            },
            Inbound::Unrecognized { reason, frame } => {
                log::warn!("dropping unrecognized frame ({reason}): {frame}");
            }
        }
    }
}

async fn receive_loop(
    mut frames: FrameReader<BoxedReader>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    link_id: u64,
) {
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break MuxError::connection("disconnected"),
            frame = frames.next_frame() => match frame {
                Ok(frame) => shared.dispatch(frame),
                Err(err) => break err,
            },
        }
    };
    cancel.cancel();
    match &reason {
        MuxError::Protocol { .. } => log::error!("receive loop stopped: {reason}"),
        _ => log::info!("receive loop stopped: {reason}"),
    }
    shared.fail_link(link_id, &reason);
}
