//! [`Transport`] backed by `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{
    SinkExt,
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, time::Instant};
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    connect_async,
    tungstenite::{self, Message, http::StatusCode},
};
use url::Url;

use super::{FrameSink, FrameSource, Incoming, Transport, TransportError, TransportHandle};
use crate::frame::Frame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Query parameter carrying the bearer token.
const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Close code reported when a close frame carries no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Websocket transport presenting the access token as a query parameter.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a websocket transport.
    #[must_use]
    pub fn new() -> Self { Self }
}

/// Append the access token to `endpoint`.
fn authenticated_url(endpoint: &Url, access_token: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair(ACCESS_TOKEN_PARAM, access_token);
    url
}

fn handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) if response.status() == StatusCode::UNAUTHORIZED => {
            TransportError::Unauthorized
        }
        tungstenite::Error::Http(response) => {
            let status = response.status();
            TransportError::Handshake {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unexpected status").to_owned(),
            }
        }
        other => TransportError::Connection(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        endpoint: &Url,
        access_token: &str,
    ) -> Result<TransportHandle, TransportError> {
        let url = authenticated_url(endpoint, access_token);
        let (stream, _response) = connect_async(url.as_str()).await.map_err(handshake_error)?;
        let (sink, source) = stream.split();
        Ok(TransportHandle::new(
            WebSocketSink { sink },
            WebSocketSource { source },
        ))
    }
}

struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match SinkExt::close(&mut self.sink).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }
}

struct WebSocketSource {
    source: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn receive(&mut self, timeout: Duration) -> Result<Incoming, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, self.source.next())
                .await
                .map_err(|_| TransportError::Timeout)?;
            let message = match next {
                None
                | Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                )) => return Ok(Incoming::Closed),
                Some(Err(e)) => return Err(TransportError::Connection(e.to_string())),
                Some(Ok(message)) => message,
            };
            match message {
                Message::Text(text) => {
                    return Ok(Incoming::Data(Frame::Text(text.as_str().to_owned())));
                }
                Message::Binary(bytes) => return Ok(Incoming::Data(Frame::Binary(bytes))),
                Message::Close(frame) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |frame| (u16::from(frame.code), frame.reason.as_str().to_owned()),
                    );
                    return Ok(Incoming::Close { code, reason });
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}
