//! Connection management for the NCID gateway link
//!
//! A single background task owns the socket. It connects, frames the byte
//! stream into lines, hands them to an [`NcidLineStream`] and, when the link
//! fails, backs off and reconnects until [`NcidConnection::stop`] is called.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    buffer::LineBuffer,
    config::NcidConfig,
    constants::{CANCEL_NOTIFY_TIMEOUT_MS, LIVENESS_POLL_MS, SOCKET_BUF_SIZE},
    error::{NcidError, NcidResult},
};

/// Connection status of the gateway link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No socket. Initial state, and the state between reconnect attempts.
    #[default]
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Socket open, lines flowing.
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Reason for the most recent disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// TCP connect failed or timed out
    ConnectFailed(String),
    /// TCP I/O error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Clean EOF on the TCP connection
    ConnectionClosed,
    /// Liveness timeout exceeded without any inbound traffic
    LivenessExpired,
    /// stop() was called
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ConnectFailed(msg) => write!(f, "connect failed: {}", msg),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::LivenessExpired => write!(f, "liveness timeout expired"),
            DisconnectReason::ClientRequested => write!(f, "client requested stop"),
        }
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> NcidResult<TcpStream> {
    match timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect to {}:{} failed: {}", host, port, e);
            Err(NcidError::Io(e))
        }
        Err(_) => {
            let timeout_ms = connect_timeout.as_millis() as u64;
            warn!("[CONNECT] TCP connect timed out after {}ms", timeout_ms);
            Err(NcidError::Timeout { timeout_ms })
        }
    }
}

/// Shared state between NcidConnection and the background task
#[derive(Default)]
struct SharedState {
    /// Set when lines have been dropped due to a full queue
    line_overflow: AtomicBool,
    /// Total count of dropped lines
    dropped_line_count: AtomicU64,
    /// Completed connects, first one included
    connect_count: AtomicU64,
    last_disconnect: std::sync::Mutex<Option<DisconnectReason>>,
}

impl SharedState {
    fn record_disconnect(&self, reason: DisconnectReason) {
        if let Ok(mut last) = self
            .last_disconnect
            .lock()
        {
            *last = Some(reason);
        }
    }
}

/// Handle to a running gateway connection (Clone + Send)
///
/// All handles share one background task. Dropping every handle, or calling
/// [`stop`](Self::stop), shuts the task down and closes the socket.
#[derive(Clone)]
pub struct NcidConnection {
    shared: Arc<SharedState>,
    status_rx: watch::Receiver<ConnectionStatus>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for NcidConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NcidConnection")
            .field("status", &self.status())
            .finish()
    }
}

/// Line stream receiver (!Clone)
///
/// Lines survive reconnects: after a gap the stream resumes with lines from
/// the new socket. Items are `Result<String, NcidError>`; an
/// `Err(NcidError::QueueFull)` means lines were dropped because the consumer
/// fell behind. When the connection is stopped, a final
/// `Err(NcidError::Cancelled)` is queued, waiting up to
/// [`CANCEL_NOTIFY_TIMEOUT_MS`] for room if the queue is full; a consumer that
/// is not draining by then misses it. `None` means the background task has
/// exited.
pub struct NcidLineStream {
    rx: mpsc::Receiver<NcidResult<String>>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for NcidLineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NcidLineStream")
            .field("status", &self.status())
            .finish()
    }
}

/// Try to send a line (or error) to the consumer via try_send.
///
/// If the channel is full, drop the item, set the overflow flag, and
/// increment the dropped counter. Before each dispatch, check the overflow
/// flag and attempt to deliver a QueueFull error notification first.
fn dispatch_line(
    line_tx: &mpsc::Sender<NcidResult<String>>,
    shared: &SharedState,
    item: NcidResult<String>,
) -> bool {
    if shared
        .line_overflow
        .load(Ordering::Relaxed)
    {
        match line_tx.try_send(Err(NcidError::QueueFull)) {
            Ok(()) => {
                shared
                    .line_overflow
                    .store(false, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(_)) => {}
        }
    }

    match line_tx.try_send(item) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
        Err(mpsc::error::TrySendError::Full(_)) => {
            shared
                .line_overflow
                .store(true, Ordering::Relaxed);
            shared
                .dropped_line_count
                .fetch_add(1, Ordering::Relaxed);
            warn!("Line queue full, dropping line");
            true
        }
    }
}

/// How a single connected session ended
enum ReadOutcome {
    /// Link lost, reconnect
    Disconnected(DisconnectReason),
    /// stop() called or all handles dropped
    Stopped,
    /// Line stream dropped, nobody to deliver to
    ConsumerGone,
}

/// Read lines from one socket until it fails or shutdown is requested.
async fn read_lines(
    mut stream: TcpStream,
    framer: &mut LineBuffer,
    shared: &SharedState,
    line_tx: &mpsc::Sender<NcidResult<String>>,
    shutdown_rx: &mut watch::Receiver<bool>,
    liveness_timeout: Option<Duration>,
) -> ReadOutcome {
    let mut read_buffer = [0u8; SOCKET_BUF_SIZE];
    let mut last_recv = Instant::now();
    let poll_interval = match liveness_timeout {
        Some(threshold) => threshold.min(Duration::from_millis(LIVENESS_POLL_MS)),
        None => Duration::from_millis(LIVENESS_POLL_MS),
    };

    loop {
        while let Some(line) = framer.next_line() {
            trace!("[RECV] {}", line);
            if !dispatch_line(line_tx, shared, Ok(line)) {
                debug!("Line channel closed, reader exiting");
                return ReadOutcome::ConsumerGone;
            }
        }

        // Wake up periodically so liveness can be checked on a silent socket
        let read_result = tokio::select! {
            r = timeout(poll_interval, stream.read(&mut read_buffer)) => r,
            _ = shutdown_rx.changed() => return ReadOutcome::Stopped,
        };

        match read_result {
            Ok(Ok(0)) => {
                info!("Connection closed (EOF)");
                return ReadOutcome::Disconnected(DisconnectReason::ConnectionClosed);
            }
            Ok(Ok(n)) => {
                trace!("[RECV] Read {} bytes from socket", n);
                last_recv = Instant::now();
                framer.extend_from_slice(&read_buffer[..n]);
                if let Err(e) = framer.check_size_limits() {
                    warn!("Buffer error: {}", e);
                    return ReadOutcome::Disconnected(DisconnectReason::IoError(e.to_string()));
                }
            }
            Ok(Err(e)) => {
                warn!("Read error: {}", e);
                return ReadOutcome::Disconnected(DisconnectReason::IoError(e.to_string()));
            }
            Err(_) => {
                if let Some(threshold) = liveness_timeout {
                    let elapsed = last_recv.elapsed();
                    if elapsed >= threshold {
                        warn!(
                            "Liveness timeout: {}ms without traffic (threshold {}ms)",
                            elapsed.as_millis(),
                            threshold.as_millis()
                        );
                        return ReadOutcome::Disconnected(DisconnectReason::LivenessExpired);
                    }
                }
            }
        }
    }
}

/// Background connection task: connect, read, back off, repeat.
async fn connection_task(
    config: NcidConfig,
    shared: Arc<SharedState>,
    status_tx: watch::Sender<ConnectionStatus>,
    line_tx: mpsc::Sender<NcidResult<String>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let result = std::panic::AssertUnwindSafe(connection_task_inner(
        &config,
        &shared,
        &status_tx,
        &line_tx,
        &mut shutdown_rx,
    ));
    if futures_util::FutureExt::catch_unwind(result)
        .await
        .is_err()
    {
        tracing::error!("connection task panicked");
        shared.record_disconnect(DisconnectReason::IoError(
            "connection task panicked".to_string(),
        ));
    } else {
        shared.record_disconnect(DisconnectReason::ClientRequested);
        let notify = line_tx.send(Err(NcidError::Cancelled));
        if timeout(Duration::from_millis(CANCEL_NOTIFY_TIMEOUT_MS), notify)
            .await
            .is_err()
        {
            debug!("Line queue still full, stop notification dropped");
        }
    }
    let _ = status_tx.send(ConnectionStatus::Disconnected);
    info!("NCID connection to {}:{} stopped", config.host, config.port);
}

async fn connection_task_inner(
    config: &NcidConfig,
    shared: &SharedState,
    status_tx: &watch::Sender<ConnectionStatus>,
    line_tx: &mpsc::Sender<NcidResult<String>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut framer = LineBuffer::new();
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let _ = status_tx.send(ConnectionStatus::Connecting);
        info!(
            "[CONNECT] Connecting to NCID server at {}:{}",
            config.host, config.port
        );

        let connect_result = tokio::select! {
            r = tcp_connect_with_timeout(&config.host, config.port, config.connect_timeout()) => r,
            _ = shutdown_rx.changed() => return,
        };

        let reason = match connect_result {
            Ok(stream) => {
                attempt = 0;
                framer.clear();
                shared
                    .connect_count
                    .fetch_add(1, Ordering::Relaxed);
                let _ = status_tx.send(ConnectionStatus::Connected);
                info!("Connected to NCID server at {}:{}", config.host, config.port);

                match read_lines(
                    stream,
                    &mut framer,
                    shared,
                    line_tx,
                    shutdown_rx,
                    config.liveness_timeout(),
                )
                .await
                {
                    ReadOutcome::Disconnected(reason) => reason,
                    ReadOutcome::Stopped | ReadOutcome::ConsumerGone => return,
                }
            }
            Err(e) => DisconnectReason::ConnectFailed(e.to_string()),
        };

        let _ = status_tx.send(ConnectionStatus::Disconnected);
        let delay = config
            .retry
            .delay(attempt);
        attempt = attempt.saturating_add(1);
        warn!(
            "NCID link down ({}), reconnecting in {}ms (attempt {})",
            reason,
            delay.as_millis(),
            attempt
        );
        shared.record_disconnect(reason);

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown_rx.changed() => return,
        }
    }
}

impl NcidConnection {
    /// Validate `config` and spawn the connection task.
    ///
    /// Returns immediately; the handle reports
    /// [`ConnectionStatus::Disconnected`] until the first connect attempt
    /// starts. Must be called from within a Tokio runtime.
    pub fn start(config: &NcidConfig) -> NcidResult<(Self, NcidLineStream)> {
        config.validate()?;

        let shared = Arc::new(SharedState::default());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let status_rx2 = status_tx.subscribe();
        let (line_tx, line_rx) = mpsc::channel(config.line_queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(connection_task(
            config.clone(),
            shared.clone(),
            status_tx,
            line_tx,
            shutdown_rx,
        ));

        let connection = NcidConnection {
            shared,
            status_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(Some(task))),
        };

        let lines = NcidLineStream {
            rx: line_rx,
            status_rx: status_rx2,
        };

        Ok((connection, lines))
    }

    /// Stop reconnecting, close the socket and wait for the task to exit.
    pub async fn stop(&self) {
        info!("Client requested stop");
        self.shutdown_tx
            .send_replace(true);
        let handle = self
            .task
            .lock()
            .await
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("connection task did not exit cleanly: {}", e);
            }
        }
    }

    /// Whether stop() has been requested.
    pub fn is_stopped(&self) -> bool {
        *self
            .shutdown_tx
            .borrow()
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        *self
            .status_rx
            .borrow()
    }

    /// Receiver that observes every status transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx
            .clone()
    }

    /// Reason for the most recent disconnect, if any.
    pub fn last_disconnect(&self) -> Option<DisconnectReason> {
        self.shared
            .last_disconnect
            .lock()
            .ok()
            .and_then(|last| last.clone())
    }

    /// Number of successful connects since start.
    pub fn connect_count(&self) -> u64 {
        self.shared
            .connect_count
            .load(Ordering::Relaxed)
    }

    /// Number of lines dropped due to a full line queue.
    pub fn dropped_line_count(&self) -> u64 {
        self.shared
            .dropped_line_count
            .load(Ordering::Relaxed)
    }
}

impl NcidLineStream {
    /// Receive the next line, or None once the connection task has exited.
    pub async fn recv(&mut self) -> Option<NcidResult<String>> {
        self.rx
            .recv()
            .await
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        *self
            .status_rx
            .borrow()
    }
}

impl futures_util::Stream for NcidLineStream {
    type Item = NcidResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}
