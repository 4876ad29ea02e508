//! Duplex streaming connection.
//!
//! A [`StreamingConnection`] owns one transport. A background listener task
//! performs the handshake, decodes inbound frames into a bounded buffer and
//! records why the connection ended. Callers send on the write half and
//! drain the buffer with [`recv`](StreamingConnection::recv) or
//! [`stream`](StreamingConnection::stream).
//!
//! The buffer is never purged on close: every message decoded before the
//! listener exits stays readable afterwards. When the buffer is full the
//! listener waits for a consumer instead of dropping frames, which may delay
//! fresher messages.
//!
//! Several tasks may consume the same connection concurrently. Each message
//! is delivered to exactly one of them.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::Stream;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::{
    sync::{CancellationToken, DropGuard},
    task::TaskTracker,
};
use tracing::debug;
use url::Url;

use crate::{
    config::ConnectionConfig,
    domain::Validate,
    error::StreamError,
    metrics::{self, Direction},
    serializer::{JsonSerializer, Serializer},
    session::ConnectionId,
    transport::{FrameSink, Transport},
};

mod downstream;
mod listener;
mod profile;
mod state;
mod upstream;

pub use downstream::DownstreamConnection;
pub use profile::{Downstream, Profile, Upstream};
pub use state::{
    CloseReason,
    ConnectionState,
    Disconnect,
    DisconnectKind,
    UNAUTHORIZED_REASON,
};
pub use upstream::UpstreamConnection;

use self::state::StateCell;

struct Shared<P: Profile, S> {
    id: ConnectionId,
    endpoint: Url,
    access_token: String,
    transport: Arc<dyn Transport>,
    serializer: S,
    config: ConnectionConfig,
    state: StateCell,
    /// Set once the handshake succeeds, before `Open` is published.
    opened: AtomicBool,
    stop: CancellationToken,
    sink: AsyncMutex<Option<Box<dyn FrameSink>>>,
    /// Producer half of the buffer, handed to the listener by `connect`.
    inbound_tx: Mutex<Option<mpsc::Sender<P::Inbound>>>,
    inbound_rx: AsyncMutex<mpsc::Receiver<P::Inbound>>,
    /// Message the listener had decoded but could not enqueue before it
    /// stopped. Read only after the buffer is drained.
    held: Mutex<Option<P::Inbound>>,
    tracker: TaskTracker,
}

/// A long-lived duplex connection to one stream of the service.
///
/// Handles are cheap to clone and share one underlying connection. Dropping
/// the last handle stops the listener.
pub struct StreamingConnection<P: Profile, S = JsonSerializer> {
    shared: Arc<Shared<P, S>>,
    _stop_on_drop: Arc<DropGuard>,
}

impl<P: Profile, S> Clone for StreamingConnection<P, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _stop_on_drop: Arc::clone(&self._stop_on_drop),
        }
    }
}

impl<P: Profile> StreamingConnection<P, JsonSerializer> {
    /// Create an unopened connection using the JSON serializer.
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: Url,
        access_token: impl Into<String>,
        config: ConnectionConfig,
    ) -> Self {
        Self::with_serializer(transport, endpoint, access_token, config, JsonSerializer)
    }
}

impl<P: Profile, S: Serializer> StreamingConnection<P, S> {
    /// Create an unopened connection using `serializer`.
    pub fn with_serializer(
        transport: Arc<dyn Transport>,
        endpoint: Url,
        access_token: impl Into<String>,
        config: ConnectionConfig,
        serializer: S,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_capacity_value());
        let stop = CancellationToken::new();
        let shared = Arc::new(Shared {
            id: ConnectionId::next(),
            endpoint,
            access_token: access_token.into(),
            transport,
            serializer,
            config,
            state: StateCell::new(),
            opened: AtomicBool::new(false),
            stop: stop.clone(),
            sink: AsyncMutex::new(None),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: AsyncMutex::new(rx),
            held: Mutex::new(None),
            tracker: TaskTracker::new(),
        });
        Self {
            shared,
            _stop_on_drop: Arc::new(stop.drop_guard()),
        }
    }

    /// Diagnostic identifier attached to this connection's log events.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.shared.id }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.shared.state.get() }

    /// Returns `true` while the connection is open.
    #[must_use]
    pub fn is_opened(&self) -> bool { matches!(self.state(), ConnectionState::Open) }

    /// Returns `true` once the listener has terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.state().is_closed() }

    /// The recorded close reason, `None` until the listener has terminated.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state() {
            ConnectionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Open the connection and wait until it is usable.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::AlreadyStarted`] if called more than once or
    /// after [`close`](Self::close), [`StreamError::HandshakeUnauthorized`]
    /// if the token is rejected, and [`StreamError::ClosedAbnormally`] or
    /// [`StreamError::ClosedOk`] if the listener ends before opening.
    pub async fn connect(&self) -> Result<(), StreamError> {
        self.connect_until(&CancellationToken::new()).await
    }

    /// Like [`connect`](Self::connect) but abandons the handshake when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`connect`](Self::connect), plus [`StreamError::Cancelled`] if
    /// `cancel` fires first. The connection is closed in that case.
    pub async fn connect_until(&self, cancel: &CancellationToken) -> Result<(), StreamError> {
        let tx = self.begin()?;
        self.shared
            .tracker
            .spawn(listener::run(Arc::clone(&self.shared), tx));
        self.shared.tracker.close();

        let state = tokio::select! {
            state = self.shared.state.wait_until(|state| {
                matches!(state, ConnectionState::Open | ConnectionState::Closed(_))
            }) => state,
            () = cancel.cancelled() => {
                self.close();
                return Err(StreamError::Cancelled);
            }
        };
        // A listener that opened and then closed before this task observed
        // `Open` still counts as a successful connect.
        if self.shared.opened.load(Ordering::Acquire) {
            return Ok(());
        }
        match state {
            ConnectionState::Closed(CloseReason::Graceful) => Err(StreamError::ClosedOk),
            ConnectionState::Closed(CloseReason::Abnormal(disconnect)) => {
                Err(match disconnect.kind() {
                    DisconnectKind::Unauthorized => StreamError::HandshakeUnauthorized,
                    _ => StreamError::ClosedAbnormally(disconnect.reason().to_owned()),
                })
            }
            _ => Ok(()),
        }
    }

    /// Claim the buffer's producer half and enter `Connecting`.
    fn begin(&self) -> Result<mpsc::Sender<P::Inbound>, StreamError> {
        let mut slot = self
            .shared
            .inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.shared.stop.is_cancelled() {
            return Err(StreamError::AlreadyStarted);
        }
        let tx = slot.take().ok_or(StreamError::AlreadyStarted)?;
        self.shared.state.advance(ConnectionState::Connecting);
        Ok(tx)
    }

    /// Encode and send `message`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidMessage`] if validation fails,
    /// [`StreamError::NotEstablished`] before the connection opens, the
    /// close outcome once it has closed and [`StreamError::Transport`] if
    /// the write fails.
    pub async fn send(&self, message: &P::Outbound) -> Result<(), StreamError> {
        message.validate()?;
        match self.state() {
            ConnectionState::Init | ConnectionState::Connecting => {
                return Err(StreamError::NotEstablished);
            }
            ConnectionState::Open => {}
            ConnectionState::Closing | ConnectionState::Closed(_) => {
                return Err(self.closed_error().await);
            }
        }
        let frame = self.shared.serializer.serialize(message)?;
        let len = frame.len();
        let mut guard = self.shared.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            drop(guard);
            return Err(self.closed_error().await);
        };
        sink.send(frame).await?;
        metrics::inc_frames(Direction::Outbound);
        debug!(connection_id = %self.shared.id, stream = P::NAME, len, "frame sent");
        Ok(())
    }

    /// Return the next buffered message.
    ///
    /// Buffered messages are returned first whatever the connection state.
    /// With a `timeout`, `Ok(None)` is returned if nothing arrives in time.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotEstablished`] if the buffer is empty and
    /// `connect` was never called, otherwise [`StreamError::ClosedOk`] or
    /// [`StreamError::ClosedAbnormally`] once the buffer is empty and the
    /// connection has closed.
    pub async fn recv(&self, timeout: Option<Duration>) -> Result<Option<P::Inbound>, StreamError> {
        let next = self.next_buffered();
        let received = match timeout {
            None => next.await?,
            Some(timeout) => match tokio::time::timeout(timeout, next).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            },
        };
        match received {
            Some(message) => Ok(Some(message)),
            None => Err(self.closed_error().await),
        }
    }

    /// Wait for the buffer and then for its next message.
    ///
    /// Returns `Ok(None)` once the buffer is drained and closed.
    async fn next_buffered(&self) -> Result<Option<P::Inbound>, StreamError> {
        let mut rx = self.shared.inbound_rx.lock().await;
        if let Ok(message) = rx.try_recv() {
            return Ok(Some(message));
        }
        if matches!(self.state(), ConnectionState::Init) {
            return Err(StreamError::NotEstablished);
        }
        Ok(match rx.recv().await {
            Some(message) => Some(message),
            None => self.take_held(),
        })
    }

    /// Like [`recv`](Self::recv) without a timeout, returning `Ok(None)` when
    /// `cancel` fires first.
    ///
    /// # Errors
    ///
    /// As [`recv`](Self::recv).
    pub async fn recv_until(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<P::Inbound>, StreamError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(None),
            received = self.recv(None) => received,
        }
    }

    /// Lazily yield inbound messages until the connection closes.
    ///
    /// Once closed, every message still buffered is yielded before the
    /// stream ends. The stream is not restartable.
    pub fn stream(&self) -> impl Stream<Item = P::Inbound> + Send + 'static {
        futures::stream::unfold(self.clone(), |conn| async move {
            let message = conn.next_streamed().await?;
            Some((message, conn))
        })
    }

    async fn next_streamed(&self) -> Option<P::Inbound> {
        let poll_interval = self.shared.config.poll_interval_value();
        loop {
            if self.is_finished() {
                let mut rx = self.shared.inbound_rx.lock().await;
                return rx.try_recv().ok().or_else(|| self.take_held());
            }
            // The lock is taken per poll so other consumers can interleave.
            let next = async {
                let mut rx = self.shared.inbound_rx.lock().await;
                match rx.recv().await {
                    Some(message) => Some(message),
                    None => self.take_held(),
                }
            };
            if let Ok(received) = tokio::time::timeout(poll_interval, next).await {
                return received;
            }
        }
    }

    /// Take the message the listener was holding when it stopped.
    fn take_held(&self) -> Option<P::Inbound> {
        self.shared
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Returns `true` once no further messages can arrive.
    fn is_finished(&self) -> bool {
        match self.state() {
            ConnectionState::Closed(_) => true,
            ConnectionState::Init => self.shared.stop.is_cancelled(),
            _ => false,
        }
    }

    /// Ask the listener to stop. Returns immediately.
    ///
    /// Calling `close` before [`connect`](Self::connect) makes the
    /// connection unusable.
    pub fn close(&self) {
        if self.shared.state.begin_closing() {
            debug!(connection_id = %self.shared.id, stream = P::NAME, "close requested");
        }
        self.shared.stop.cancel();
    }

    /// Wait until the listener has exited and return the close reason.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotEstablished`] if `connect` was never
    /// called.
    pub async fn wait_closed(&self) -> Result<CloseReason, StreamError> {
        if matches!(self.state(), ConnectionState::Init) {
            return Err(StreamError::NotEstablished);
        }
        self.shared.tracker.wait().await;
        Ok(self.shared.state.closed().await)
    }

    async fn closed_error(&self) -> StreamError {
        match self.shared.state.closed().await {
            CloseReason::Graceful => StreamError::ClosedOk,
            CloseReason::Abnormal(disconnect) => {
                StreamError::ClosedAbnormally(disconnect.reason().to_owned())
            }
        }
    }
}

impl<P: Profile, S> fmt::Debug for StreamingConnection<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingConnection")
            .field("id", &self.shared.id)
            .field("stream", &P::NAME)
            .field("endpoint", &self.shared.endpoint.as_str())
            .field("state", &self.shared.state.get())
            .finish_non_exhaustive()
    }
}
