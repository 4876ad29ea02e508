//! Connection lifecycle state.
//!
//! The state only ever moves forward through
//! `Init → Connecting → Open → Closing → Closed`. States may be skipped but
//! never re-entered, and the [`CloseReason`] carried by `Closed` is written
//! exactly once.

use std::fmt;

use tokio::sync::watch;

/// Human-readable close reason for a rejected access token.
pub const UNAUTHORIZED_REASON: &str = "Unauthorized. Incorrect access_token sent.";

/// Lifecycle state of a streaming connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed; `connect` has not been called.
    Init,
    /// The handshake is in progress.
    Connecting,
    /// The handshake completed and frames are flowing.
    Open,
    /// `close` was requested and the listener is shutting down.
    Closing,
    /// The listener has terminated.
    Closed(CloseReason),
}

impl ConnectionState {
    fn rank(&self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
            Self::Closed(_) => 4,
        }
    }

    /// Returns `true` once the listener has terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool { matches!(self, Self::Closed(_)) }
}

/// Why a connection closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly shutdown with no error condition.
    Graceful,
    /// Termination caused by a transport, protocol or authentication failure.
    Abnormal(Disconnect),
}

impl CloseReason {
    /// Returns `true` for an orderly shutdown.
    #[must_use]
    pub fn is_graceful(&self) -> bool { matches!(self, Self::Graceful) }

    /// Description of an abnormal close, `None` when graceful.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Graceful => None,
            Self::Abnormal(disconnect) => Some(disconnect.reason()),
        }
    }
}

/// Category of an abnormal close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectKind {
    /// The service rejected the access token.
    Unauthorized,
    /// The handshake failed for another reason.
    Handshake,
    /// The service sent a close frame with a non-normal code.
    Remote { code: u16 },
    /// The transport failed or ended without a close frame.
    Network,
    /// The listener stopped unexpectedly.
    Internal,
}

/// Details of an abnormal close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disconnect {
    kind: DisconnectKind,
    reason: String,
}

impl Disconnect {
    /// Create a disconnect of `kind` described by `reason`.
    #[must_use]
    pub fn new(kind: DisconnectKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Category of the failure.
    #[must_use]
    pub fn kind(&self) -> DisconnectKind { self.kind }

    /// Human-readable description of the failure.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.reason) }
}

/// Shared, monotonic holder of a connection's state.
pub(crate) struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Init);
        Self { tx }
    }

    /// Snapshot of the current state.
    pub(crate) fn get(&self) -> ConnectionState { self.tx.borrow().clone() }

    /// Move to `next` if it lies after the current state.
    ///
    /// Returns `true` if the state changed.
    pub(crate) fn advance(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            if next.rank() > current.rank() {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Move to `Closing` if the connection is connecting or open.
    pub(crate) fn begin_closing(&self) -> bool {
        self.tx.send_if_modified(|current| {
            if matches!(current, ConnectionState::Connecting | ConnectionState::Open) {
                *current = ConnectionState::Closing;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the state satisfies `predicate` and return it.
    pub(crate) async fn wait_until(
        &self,
        mut predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut rx = self.tx.subscribe();
        let observed = rx.wait_for(|state| predicate(state)).await.map(|state| state.clone());
        // The sender lives as long as `self`, so the wait cannot fail.
        observed.unwrap_or_else(|_| self.get())
    }

    /// Wait for the close reason.
    pub(crate) async fn closed(&self) -> CloseReason {
        match self.wait_until(ConnectionState::is_closed).await {
            ConnectionState::Closed(reason) => reason,
            _ => CloseReason::Graceful,
        }
    }
}
