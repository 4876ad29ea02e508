//! Factory binding shared credentials to streaming connections.

use std::{fmt, marker::PhantomData, sync::Arc};

use log::{debug, warn};
use url::Url;

use crate::{
    config::ConnectionConfig,
    connection::{Downstream, Profile, StreamingConnection, Upstream},
    error::StreamError,
    serializer::{JsonSerializer, Serializer},
    transport::{Transport, WebSocketTransport},
};

/// Builds [`StreamingConnection`]s for one stream endpoint.
///
/// The manager holds the transport, endpoint, access token and a
/// configuration template shared by every connection it creates.
pub struct ConnectionManager<P: Profile, T: Transport, S = JsonSerializer> {
    transport: Arc<T>,
    endpoint: Url,
    access_token: String,
    config: ConnectionConfig,
    serializer: S,
    _profile: PhantomData<fn() -> P>,
}

/// Manager for upstream connections over websockets.
pub type UpstreamConnectionManager<T = WebSocketTransport, S = JsonSerializer> =
    ConnectionManager<Upstream, T, S>;

/// Manager for downstream connections over websockets.
pub type DownstreamConnectionManager<T = WebSocketTransport, S = JsonSerializer> =
    ConnectionManager<Downstream, T, S>;

impl<P: Profile> ConnectionManager<P, WebSocketTransport, JsonSerializer> {
    /// Create a manager connecting to `endpoint` over websockets.
    pub fn websocket(endpoint: Url, access_token: impl Into<String>) -> Self {
        Self::new(Arc::new(WebSocketTransport::new()), endpoint, access_token)
    }
}

impl<P: Profile, T: Transport> ConnectionManager<P, T, JsonSerializer> {
    /// Create a manager using `transport` and the JSON serializer.
    pub fn new(transport: Arc<T>, endpoint: Url, access_token: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint,
            access_token: access_token.into(),
            config: ConnectionConfig::default(),
            serializer: JsonSerializer,
            _profile: PhantomData,
        }
    }
}

impl<P: Profile, T: Transport, S: Serializer + Clone> ConnectionManager<P, T, S> {
    /// Replace the configuration template.
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `serializer` for connections created from now on.
    #[must_use]
    pub fn with_serializer<S2: Serializer + Clone>(self, serializer: S2) -> ConnectionManager<P, T, S2> {
        ConnectionManager {
            transport: self.transport,
            endpoint: self.endpoint,
            access_token: self.access_token,
            config: self.config,
            serializer,
            _profile: PhantomData,
        }
    }

    /// Endpoint the connections are opened against.
    #[must_use]
    pub fn endpoint(&self) -> &Url { &self.endpoint }

    /// Build an unopened connection with an inbound buffer of `capacity`.
    ///
    /// The caller drives [`connect`](StreamingConnection::connect) and
    /// [`close`](StreamingConnection::close).
    pub fn connection(&self, capacity: usize) -> StreamingConnection<P, S> {
        let config = self.config.buffer_capacity(capacity);
        let transport: Arc<dyn Transport> = self.transport.clone();
        StreamingConnection::with_serializer(
            transport,
            self.endpoint.clone(),
            self.access_token.clone(),
            config,
            self.serializer.clone(),
        )
    }

    /// Build a connection with an inbound buffer of `capacity` and open it.
    ///
    /// # Errors
    ///
    /// Returns the [`connect`](StreamingConnection::connect) failure.
    pub async fn create_connection(
        &self,
        capacity: usize,
    ) -> Result<StreamingConnection<P, S>, StreamError> {
        let connection = self.connection(capacity);
        match connection.connect().await {
            Ok(()) => {
                debug!(
                    "{} connection {} opened to {}",
                    P::NAME,
                    connection.id(),
                    self.endpoint
                );
                Ok(connection)
            }
            Err(e) => {
                warn!("{} connection to {} failed: {e}", P::NAME, self.endpoint);
                Err(e)
            }
        }
    }
}

impl<P: Profile, T: Transport, S> fmt::Debug for ConnectionManager<P, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("stream", &P::NAME)
            .field("endpoint", &self.endpoint.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
