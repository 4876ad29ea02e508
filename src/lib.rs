#![doc(html_root_url = "https://docs.rs/ranroute/latest")]
//! Public API for the `ranroute` library.
//!
//! This crate provides client-side duplex streaming connections to a LoRaWAN
//! packet routing service: a listener-driven [`StreamingConnection`] with a
//! bounded inbound buffer, a [`ConnectionManager`] that binds shared
//! credentials, and a [`CorrelationTracker`] matching asynchronous replies
//! to the requests that caused them.

pub mod config;
pub mod connection;
pub mod correlation;
pub mod domain;
pub mod error;
pub mod frame;
pub mod manager;
pub mod metrics;
pub mod serializer;
pub mod session;
pub mod transport;

pub use config::ConnectionConfig;
pub use connection::{
    CloseReason,
    ConnectionState,
    Disconnect,
    DisconnectKind,
    Downstream,
    DownstreamConnection,
    Profile,
    StreamingConnection,
    Upstream,
    UpstreamConnection,
};
pub use correlation::{Correlated, CorrelationError, CorrelationTracker, Dispatch, ReplyKind, Waiter};
pub use error::StreamError;
pub use frame::Frame;
pub use manager::{ConnectionManager, DownstreamConnectionManager, UpstreamConnectionManager};
pub use metrics::{CONNECTIONS_OPEN, DECODE_ERRORS_TOTAL, Direction, FRAMES_TOTAL};
pub use serializer::{CodecError, JsonSerializer, Serializer};
pub use session::ConnectionId;
pub use transport::{
    FrameSink,
    FrameSource,
    Incoming,
    Transport,
    TransportError,
    TransportHandle,
    WebSocketTransport,
};
