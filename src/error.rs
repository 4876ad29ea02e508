//! Canonical error type for streaming connections.
//!
//! `StreamError` is what callers of a connection branch on: whether the
//! connection never opened, closed cleanly, or closed abnormally, plus the
//! failures that can surface from a single send.

use thiserror::Error;

use crate::{domain::ParameterError, serializer::CodecError, transport::TransportError};

/// Errors surfaced by [`StreamingConnection`](crate::StreamingConnection)
/// operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The operation needs an open connection and `connect` has not
    /// completed.
    #[error("connection not established")]
    NotEstablished,
    /// No message was available and the connection closed gracefully.
    #[error("connection closed")]
    ClosedOk,
    /// No message was available and the connection closed because of a
    /// network, protocol or authentication failure.
    #[error("connection closed abnormally: {0}")]
    ClosedAbnormally(String),
    /// The service rejected the access token during the handshake.
    #[error("handshake rejected: unauthorized")]
    HandshakeUnauthorized,
    /// `connect` was called on a connection that already left the initial
    /// state.
    #[error("connection already started")]
    AlreadyStarted,
    /// The cancellation token fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
    /// An outbound message failed validation.
    #[error(transparent)]
    InvalidMessage(#[from] ParameterError),
    /// An outbound message could not be encoded.
    #[error(transparent)]
    Codec(CodecError),
    /// The transport failed while writing.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<CodecError> for StreamError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Invalid(e) => Self::InvalidMessage(e),
            other => Self::Codec(other),
        }
    }
}

impl StreamError {
    /// Returns `true` for the outcomes that describe the connection's
    /// lifecycle rather than a single failed operation.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        matches!(
            self,
            Self::NotEstablished
                | Self::ClosedOk
                | Self::ClosedAbnormally(_)
                | Self::HandshakeUnauthorized
        )
    }
}
