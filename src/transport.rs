//! Pluggable duplex transport beneath a streaming connection.
//!
//! A [`Transport`] performs the handshake and hands back a
//! [`TransportHandle`] split into a write half ([`FrameSink`]) and a read
//! half ([`FrameSource`]). The listener owns the read half while callers
//! share the write half, so reads never contend with writes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::frame::Frame;

mod websocket;

pub use websocket::WebSocketTransport;

/// Close code signalling a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Errors raised by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The service rejected the access token during the handshake.
    #[error("handshake rejected: unauthorized")]
    Unauthorized,
    /// The handshake failed with an unexpected HTTP status.
    #[error("handshake failed with status {status}: {message}")]
    Handshake { status: u16, message: String },
    /// The underlying connection failed.
    #[error("{0}")]
    Connection(String),
    /// No event arrived before the receive deadline.
    #[error("receive timed out")]
    Timeout,
}

/// An event observed on the read half of a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Incoming {
    /// A data frame.
    Data(Frame),
    /// The peer sent a close frame.
    Close { code: u16, reason: String },
    /// The stream ended without a close frame.
    Closed,
}

/// Write half of an established transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if the frame cannot be written.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the transport, sending a close frame where supported.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if the close cannot be written.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an established transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait up to `timeout` for the next event.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if nothing arrives in time or
    /// [`TransportError::Connection`] if the stream fails.
    async fn receive(&mut self, timeout: Duration) -> Result<Incoming, TransportError>;
}

/// The two halves of an established transport.
pub struct TransportHandle {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl TransportHandle {
    /// Bundle a sink and source produced by the same handshake.
    pub fn new(sink: impl FrameSink + 'static, source: impl FrameSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

/// Establishes authenticated duplex connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint` presenting `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unauthorized`] if the token is rejected,
    /// [`TransportError::Handshake`] for other handshake failures and
    /// [`TransportError::Connection`] if the peer cannot be reached.
    async fn connect(
        &self,
        endpoint: &Url,
        access_token: &str,
    ) -> Result<TransportHandle, TransportError>;
}
