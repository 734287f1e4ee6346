//! PTY service and terminal sessions
//!
//! Control operations (create, resize, kill) go over HTTP. Terminal bytes
//! flow over a websocket opened per session: one background task reads
//! frames and publishes them to the registered data observer, while writes
//! go out through the session's single write half.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::domain::types::{PtyInfo, PtyOptions, ResizePtyRequest};
use crate::error::{Error, Result};
use crate::infra::http::HttpTransport;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketSource = SplitStream<Socket>;

/// Frames buffered between the reader and a slow data observer
const DATA_CHANNEL_CAPACITY: usize = 64;

/// Why a terminal session closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `kill()` was called or the session was dropped
    Killed,
    /// The server closed the connection
    Disconnected,
    /// The connection failed
    Failed(String),
}

/// PTY service for managing interactive terminals
#[derive(Clone)]
pub struct PtyService {
    transport: HttpTransport,
    connect_timeout: Duration,
    backlog_bytes: usize,
}

impl PtyService {
    pub(crate) fn new(transport: HttpTransport, connect_timeout: Duration, backlog_bytes: usize) -> Self {
        Self {
            transport,
            connect_timeout,
            backlog_bytes,
        }
    }

    /// Allocate a terminal and attach to it
    pub async fn create(&self, sandbox_id: &str, opts: PtyOptions) -> Result<TerminalSession> {
        let info: PtyInfo = self
            .transport
            .post(&format!("/sandboxes/{}/pty", sandbox_id), &opts)
            .await?;

        info!(
            "Created PTY {} in sandbox {} ({}x{})",
            info.id, sandbox_id, info.cols, info.rows
        );

        let socket = match self.connect(sandbox_id, &info.id).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Failed to attach to PTY {}: {}", info.id, e);
                if let Err(cleanup) = self.kill(sandbox_id, &info.id).await {
                    debug!("Cleanup of PTY {} failed: {}", info.id, cleanup);
                }
                return Err(e);
            }
        };

        Ok(TerminalSession::start(
            self.transport.clone(),
            sandbox_id.to_string(),
            info,
            socket,
            self.backlog_bytes,
        ))
    }

    /// Resize a terminal by id
    pub async fn resize(&self, sandbox_id: &str, pty_id: &str, cols: u16, rows: u16) -> Result<()> {
        info!(
            "Resizing PTY {} in sandbox {} to {}x{}",
            pty_id, sandbox_id, cols, rows
        );
        self.transport
            .post_unit(&resize_path(sandbox_id, pty_id), &ResizePtyRequest { cols, rows })
            .await
    }

    /// Release a terminal by id
    pub async fn kill(&self, sandbox_id: &str, pty_id: &str) -> Result<()> {
        info!("Killing PTY {} in sandbox {}", pty_id, sandbox_id);
        self.transport.delete(&pty_path(sandbox_id, pty_id)).await
    }

    async fn connect(&self, sandbox_id: &str, pty_id: &str) -> Result<Socket> {
        let url = self.transport.socket_url(&pty_path(sandbox_id, pty_id));
        let mut request = url.as_str().into_client_request()?;
        if let Some(key) = self.transport.api_key() {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| Error::InvalidConfig(format!("api key: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        debug!("Connecting terminal socket {}", url);
        let connected = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| Error::WaitTimeout(format!("terminal connection to {}", url)))?;

        match connected {
            Ok((socket, _)) => Ok(socket),
            Err(WsError::Http(response)) => Err(handshake_error(&response)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Translate a refused upgrade like any other error response
fn handshake_error(response: &Response<Option<Vec<u8>>>) -> Error {
    let status = reqwest::StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(reqwest::StatusCode::BAD_GATEWAY);
    let body = response
        .body()
        .as_deref()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    debug!("Terminal socket refused with {}: {}", status, body);
    Error::from_response_body(status, &body)
}

fn pty_path(sandbox_id: &str, pty_id: &str) -> String {
    format!("/sandboxes/{}/pty/{}", sandbox_id, pty_id)
}

fn resize_path(sandbox_id: &str, pty_id: &str) -> String {
    format!("/sandboxes/{}/pty/{}/resize", sandbox_id, pty_id)
}

/// Observer registrations and output waiting for an observer
struct Observers {
    data: Option<mpsc::Sender<Bytes>>,
    close: Option<oneshot::Sender<CloseReason>>,
    close_reason: Option<CloseReason>,
    backlog: VecDeque<Bytes>,
    backlog_len: usize,
    backlog_limit: usize,
}

impl Observers {
    fn new(backlog_limit: usize) -> Self {
        Self {
            data: None,
            close: None,
            close_reason: None,
            backlog: VecDeque::new(),
            backlog_len: 0,
            backlog_limit,
        }
    }

    /// Replace the data observer, handing it whatever was buffered
    fn register_data(&mut self) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(DATA_CHANNEL_CAPACITY.max(self.backlog.len()));
        for frame in self.backlog.drain(..) {
            // Capacity covers the whole backlog
            let _ = tx.try_send(frame);
        }
        self.backlog_len = 0;

        // Once closed the receiver only sees the backlog
        if self.close_reason.is_none() {
            self.data = Some(tx);
        }
        rx
    }

    /// Pick the observer for a frame, buffering it when there is none.
    ///
    /// Deciding and stashing happen under one borrow so a concurrent
    /// `register_data` cannot slip in between.
    fn route(&mut self, frame: Bytes) -> Option<(mpsc::Sender<Bytes>, Bytes)> {
        match self.data.clone() {
            Some(tx) => Some((tx, frame)),
            None => {
                self.stash(frame);
                None
            }
        }
    }

    fn register_close(&mut self) -> oneshot::Receiver<CloseReason> {
        let (tx, rx) = oneshot::channel();
        match &self.close_reason {
            Some(reason) => {
                let _ = tx.send(reason.clone());
            }
            None => self.close = Some(tx),
        }
        rx
    }

    /// Keep a frame nobody is listening for, dropping the oldest bytes first
    fn stash(&mut self, frame: Bytes) {
        if self.backlog_limit == 0 {
            return;
        }
        let frame = if frame.len() > self.backlog_limit {
            frame.slice(frame.len() - self.backlog_limit..)
        } else {
            frame
        };

        self.backlog_len += frame.len();
        self.backlog.push_back(frame);
        while self.backlog_len > self.backlog_limit {
            match self.backlog.pop_front() {
                Some(dropped) => {
                    self.backlog_len -= dropped.len();
                    debug!("Dropped {} bytes of unobserved terminal output", dropped.len());
                }
                None => break,
            }
        }
    }

    fn mark_closed(&mut self, reason: CloseReason) {
        if self.close_reason.is_some() {
            return;
        }
        if let Some(tx) = self.close.take() {
            let _ = tx.send(reason.clone());
        }
        self.close_reason = Some(reason);
        self.data = None;
    }
}

/// State shared between a session and its reader task
struct SessionShared {
    closed: AtomicBool,
    sink: tokio::sync::Mutex<Option<SocketSink>>,
    observers: Mutex<Observers>,
    replaced: Notify,
}

impl SessionShared {
    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition to closed. Returns false if already closed.
    async fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Closing terminal socket failed: {}", e);
            }
        }

        self.observers().mark_closed(reason);
        true
    }

    /// Hand a frame to the current data observer, or buffer it
    async fn dispatch(&self, mut frame: Bytes) {
        loop {
            // Armed before routing so a replacement in between is not missed
            let replaced = self.replaced.notified();
            tokio::pin!(replaced);

            let Some((tx, routed)) = self.observers().route(frame) else {
                return;
            };
            frame = routed;

            tokio::select! {
                permit = tx.reserve() => match permit {
                    Ok(permit) => {
                        permit.send(frame);
                        return;
                    }
                    Err(_) => {
                        // Observer went away; retry with its replacement, if any
                        let mut observers = self.observers();
                        if observers
                            .data
                            .as_ref()
                            .is_some_and(|current| current.same_channel(&tx))
                        {
                            observers.data = None;
                        }
                    }
                },
                _ = &mut replaced => {
                    debug!("Data observer replaced while full; rerouting frame");
                }
            }
        }
    }
}

async fn read_loop(shared: Arc<SessionShared>, mut source: SocketSource, pty_id: String) {
    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Binary(data))) => shared.dispatch(data).await,
            Some(Ok(Message::Text(text))) => {
                shared
                    .dispatch(Bytes::copy_from_slice(text.as_str().as_bytes()))
                    .await
            }
            Some(Ok(Message::Close(frame))) => {
                debug!("PTY {} received close frame: {:?}", pty_id, frame);
                break CloseReason::Disconnected;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break CloseReason::Failed(e.to_string()),
            None => break CloseReason::Disconnected,
        }
    };

    if shared.close(reason.clone()).await {
        warn!("PTY {} closed by transport: {:?}", pty_id, reason);
    }
}

/// Interactive terminal attached to a sandbox.
///
/// Lives until [`kill`](TerminalSession::kill) is called, the connection
/// drops, or the session is dropped. All methods take `&self`; wrap the
/// session in an `Arc` to share it between tasks.
pub struct TerminalSession {
    id: String,
    sandbox_id: String,
    cols: AtomicU16,
    rows: AtomicU16,
    killed: AtomicBool,
    shared: Arc<SessionShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    transport: HttpTransport,
}

impl TerminalSession {
    fn start(
        transport: HttpTransport,
        sandbox_id: String,
        info: PtyInfo,
        socket: Socket,
        backlog_bytes: usize,
    ) -> Self {
        let (sink, source) = socket.split();
        let shared = Arc::new(SessionShared {
            closed: AtomicBool::new(false),
            sink: tokio::sync::Mutex::new(Some(sink)),
            observers: Mutex::new(Observers::new(backlog_bytes)),
            replaced: Notify::new(),
        });

        let reader = tokio::spawn(read_loop(shared.clone(), source, info.id.clone()));

        Self {
            id: info.id,
            sandbox_id,
            cols: AtomicU16::new(info.cols),
            rows: AtomicU16::new(info.rows),
            killed: AtomicBool::new(false),
            shared,
            reader: Mutex::new(Some(reader)),
            transport,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn cols(&self) -> u16 {
        self.cols.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u16 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Send bytes to the terminal as one frame
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        let mut sink = self.shared.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(Error::SessionClosed);
        };
        sink.send(Message::Binary(data.into())).await?;
        Ok(())
    }

    pub async fn write_str(&self, data: &str) -> Result<()> {
        self.write(Bytes::copy_from_slice(data.as_bytes())).await
    }

    /// Change the terminal dimensions. Does not touch the data stream.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        debug!("Resizing PTY {} to {}x{}", self.id, cols, rows);
        self.transport
            .post_unit(
                &resize_path(&self.sandbox_id, &self.id),
                &ResizePtyRequest { cols, rows },
            )
            .await?;

        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(rows, Ordering::Relaxed);
        Ok(())
    }

    /// Close the session and release it on the server.
    ///
    /// Later calls return `Ok(())` without doing anything.
    pub async fn kill(&self) -> Result<()> {
        if self.killed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Killing PTY {} in sandbox {}", self.id, self.sandbox_id);
        let was_open = self.shared.close(CloseReason::Killed).await;
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }

        match self.transport.delete(&pty_path(&self.sandbox_id, &self.id)).await {
            // Already released after the transport dropped
            Err(Error::PtyNotFound { .. }) if !was_open => Ok(()),
            other => other,
        }
    }

    /// Register the data observer.
    ///
    /// Replaces (and ends) any previous observer, even one that stopped
    /// reading with a full buffer. Output that arrived while nobody was
    /// observing is delivered first.
    pub fn on_data(&self) -> TerminalOutput {
        let rx = self.shared.observers().register_data();
        self.shared.replaced.notify_waiters();
        TerminalOutput {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Register the close observer. Replaces any previous one.
    pub fn on_close(&self) -> CloseNotice {
        CloseNotice {
            rx: self.shared.observers().register_close(),
        }
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
        if self.killed.load(Ordering::SeqCst) {
            return;
        }

        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.observers().mark_closed(CloseReason::Killed);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = self.transport.clone();
                let path = pty_path(&self.sandbox_id, &self.id);
                let id = self.id.clone();
                handle.spawn(async move {
                    if let Err(e) = transport.delete(&path).await {
                        debug!("Cleanup of dropped PTY {} failed: {}", id, e);
                    }
                });
            }
            Err(_) => warn!(
                "PTY {} dropped outside a runtime without kill(); server session left allocated",
                self.id
            ),
        }
    }
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("sandbox_id", &self.sandbox_id)
            .field("cols", &self.cols())
            .field("rows", &self.rows())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Terminal output delivered to a data observer
#[derive(Debug)]
pub struct TerminalOutput {
    inner: ReceiverStream<Bytes>,
}

impl TerminalOutput {
    /// Next chunk of output; `None` once the session closed or the observer
    /// was replaced
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inner.next().await
    }
}

impl Stream for TerminalOutput {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Resolves when the session closes; `None` if the observer was replaced
#[derive(Debug)]
pub struct CloseNotice {
    rx: oneshot::Receiver<CloseReason>,
}

impl Future for CloseNotice {
    type Output = Option<CloseReason>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.ok())
    }
}
