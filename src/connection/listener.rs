//! The per-connection listener task.
//!
//! The listener performs the handshake, owns the read half of the transport
//! and is the only producer for the inbound buffer. It records the close
//! reason exactly once when it exits.

use std::sync::{Arc, PoisonError, atomic::Ordering};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    Shared,
    profile::Profile,
    state::{CloseReason, ConnectionState, Disconnect, DisconnectKind, StateCell, UNAUTHORIZED_REASON},
};
use crate::{
    domain::Validate,
    frame::Frame,
    metrics::{self, Direction},
    serializer::{CodecError, Serializer},
    transport::{FrameSource, Incoming, NORMAL_CLOSURE, TransportError, TransportHandle},
};

/// Records an abnormal close if the listener unwinds without setting one.
struct ExitGuard<'a>(&'a StateCell);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.advance(ConnectionState::Closed(CloseReason::Abnormal(Disconnect::new(
            DisconnectKind::Internal,
            "Connection closed due to listener termination",
        ))));
    }
}

/// Keeps the open connections gauge in step with the read loop.
struct OpenGauge;

impl OpenGauge {
    fn new() -> Self {
        metrics::inc_connections();
        Self
    }
}

impl Drop for OpenGauge {
    fn drop(&mut self) { metrics::dec_connections(); }
}

fn abnormal(kind: DisconnectKind, reason: impl Into<String>) -> CloseReason {
    CloseReason::Abnormal(Disconnect::new(kind, reason))
}

/// Run the listener until the transport ends or a stop is requested.
///
/// `tx` is dropped only after the close reason is recorded so consumers that
/// observe the end of the buffer always find the connection closed.
pub(super) async fn run<P, S>(shared: Arc<Shared<P, S>>, tx: mpsc::Sender<P::Inbound>)
where
    P: Profile,
    S: Serializer,
{
    let _guard = ExitGuard(&shared.state);
    debug!(connection_id = %shared.id, stream = P::NAME, endpoint = %shared.endpoint, "connecting");

    let handshake = tokio::select! {
        biased;
        () = shared.stop.cancelled() => None,
        result = shared.transport.connect(&shared.endpoint, &shared.access_token) => Some(result),
    };
    let reason = match handshake {
        None => CloseReason::Graceful,
        Some(Ok(handle)) => serve(&shared, handle, &tx).await,
        Some(Err(e)) => handshake_failure::<P, S>(&shared, e),
    };

    match reason.description() {
        None => info!(connection_id = %shared.id, stream = P::NAME, "connection closed"),
        Some(description) => warn!(
            connection_id = %shared.id,
            stream = P::NAME,
            reason = description,
            "connection closed abnormally"
        ),
    }
    shared.state.advance(ConnectionState::Closed(reason));
}

fn handshake_failure<P: Profile, S>(shared: &Shared<P, S>, err: TransportError) -> CloseReason {
    match err {
        TransportError::Unauthorized => {
            error!(connection_id = %shared.id, stream = P::NAME, "{UNAUTHORIZED_REASON}");
            abnormal(DisconnectKind::Unauthorized, UNAUTHORIZED_REASON)
        }
        e @ TransportError::Handshake { .. } => abnormal(
            DisconnectKind::Handshake,
            format!("Connection closed due to unhandled handshake error: {e}"),
        ),
        e => abnormal(DisconnectKind::Network, format!("Connection closed due to {e}")),
    }
}

async fn serve<P, S>(
    shared: &Shared<P, S>,
    handle: TransportHandle,
    tx: &mpsc::Sender<P::Inbound>,
) -> CloseReason
where
    P: Profile,
    S: Serializer,
{
    let TransportHandle { sink, mut source } = handle;
    *shared.sink.lock().await = Some(sink);
    shared.opened.store(true, Ordering::Release);
    shared.state.advance(ConnectionState::Open);
    info!(connection_id = %shared.id, stream = P::NAME, "connection opened");

    let reason = {
        let _gauge = OpenGauge::new();
        read_loop(shared, source.as_mut(), tx).await
    };

    let sink = shared.sink.lock().await.take();
    if let Some(mut sink) = sink {
        match tokio::time::timeout(shared.config.read_timeout_value(), sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(connection_id = %shared.id, error = %e, "close frame not sent"),
            Err(_) => debug!(connection_id = %shared.id, "close frame timed out"),
        }
    }
    reason
}

async fn read_loop<P, S>(
    shared: &Shared<P, S>,
    source: &mut dyn FrameSource,
    tx: &mpsc::Sender<P::Inbound>,
) -> CloseReason
where
    P: Profile,
    S: Serializer,
{
    let read_timeout = shared.config.read_timeout_value();
    loop {
        let event = tokio::select! {
            biased;
            () = shared.stop.cancelled() => return CloseReason::Graceful,
            event = source.receive(read_timeout) => event,
        };
        match event {
            Err(TransportError::Timeout) => {}
            Err(e) => {
                return abnormal(DisconnectKind::Network, format!("Connection closed due to {e}"));
            }
            Ok(Incoming::Data(frame)) => {
                metrics::inc_frames(Direction::Inbound);
                let message = match decode::<P, S>(&shared.serializer, &frame) {
                    Ok(message) => message,
                    Err(e) => {
                        metrics::inc_decode_errors();
                        error!(
                            connection_id = %shared.id,
                            stream = P::NAME,
                            error = %e,
                            len = frame.len(),
                            "dropping broken message"
                        );
                        continue;
                    }
                };
                if tx.capacity() == 0 {
                    debug!(
                        connection_id = %shared.id,
                        stream = P::NAME,
                        "inbound buffer full; waiting for a consumer"
                    );
                }
                tokio::select! {
                    biased;
                    permit = tx.reserve() => match permit {
                        Ok(permit) => permit.send(message),
                        Err(_) => return CloseReason::Graceful,
                    },
                    () = shared.stop.cancelled() => {
                        debug!(
                            connection_id = %shared.id,
                            stream = P::NAME,
                            "stop requested while buffer full; holding message for consumers"
                        );
                        *shared.held.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
                        return CloseReason::Graceful;
                    }
                }
            }
            Ok(Incoming::Close { code, reason }) if code == NORMAL_CLOSURE => {
                debug!(connection_id = %shared.id, stream = P::NAME, %reason, "close frame received");
                return CloseReason::Graceful;
            }
            Ok(Incoming::Close { code, reason }) => {
                return abnormal(
                    DisconnectKind::Remote { code },
                    format!("Connection closed with ws closed_code: {code}; reason: {reason}"),
                );
            }
            Ok(Incoming::Closed) => {
                return abnormal(
                    DisconnectKind::Network,
                    "Connection closed due to unknown network reason",
                );
            }
        }
    }
}

fn decode<P, S>(serializer: &S, frame: &Frame) -> Result<P::Inbound, CodecError>
where
    P: Profile,
    S: Serializer,
{
    let message: P::Inbound = serializer.deserialize(frame)?;
    message.validate()?;
    Ok(message)
}
