//! End-to-end tests against a local websocket server.

use std::{net::SocketAddr, time::Duration};

use futures::{SinkExt, StreamExt};
use ranroute::{CloseReason, StreamError, UpstreamConnectionManager};
use ranroute_testing::upstream_message;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::oneshot,
    task::JoinHandle,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

const DEADLINE: Duration = Duration::from_secs(10);

async fn local_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

fn endpoint(addr: SocketAddr) -> Url {
    Url::parse(&format!("ws://{addr}/upstream")).expect("endpoint")
}

/// Accept one websocket, push an uplink, read the reply and close normally.
fn uplink_server(
    listener: TcpListener,
    request_uri: oneshot::Sender<String>,
) -> JoinHandle<serde_json::Value> {
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = request_uri.send(request.uri().to_string());
            Ok(response)
        };
        let mut ws = accept_hdr_async(stream, callback).await.expect("handshake");

        let uplink = serde_json::to_string(&upstream_message(5)).expect("encode uplink");
        ws.send(Message::text(uplink)).await.expect("send uplink");
        let reply = loop {
            match ws.next().await.expect("reply").expect("read reply") {
                Message::Text(text) => {
                    break serde_json::from_str(text.as_str()).expect("reply json");
                }
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("unexpected message: {other:?}"),
            }
        };
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "done".into(),
        })))
        .await
        .expect("send close");
        while let Some(Ok(_)) = ws.next().await {}
        reply
    })
}

/// Answer one raw HTTP request with `response`.
fn raw_http_server(listener: TcpListener, response: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.expect("read request");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream.write_all(response.as_bytes()).await.expect("write response");
        let _ = stream.shutdown().await;
    })
}

#[tokio::test]
async fn uplink_round_trip_over_websocket() {
    let (listener, addr) = local_listener().await;
    let (uri_tx, uri_rx) = oneshot::channel();
    let server = uplink_server(listener, uri_tx);
    let manager: UpstreamConnectionManager = UpstreamConnectionManager::websocket(endpoint(addr), "s3cr3t");

    let connection = tokio::time::timeout(DEADLINE, manager.create_connection(4))
        .await
        .expect("connect in time")
        .expect("connect");
    assert_eq!(uri_rx.await.expect("request uri"), "/upstream?access_token=s3cr3t");

    let uplink = connection
        .recv(Some(DEADLINE))
        .await
        .expect("recv")
        .expect("uplink before timeout");
    assert_eq!(uplink, upstream_message(5));
    connection
        .send_upstream_ack(5, 0x7ABE_1B8C_93D7_174F, 0xAA59_5854)
        .await
        .expect("send ack");

    let reason = tokio::time::timeout(DEADLINE, connection.wait_closed())
        .await
        .expect("closed in time")
        .expect("wait closed");
    assert_eq!(reason, CloseReason::Graceful);

    let reply = tokio::time::timeout(DEADLINE, server)
        .await
        .expect("server in time")
        .expect("server task");
    assert_eq!(reply["TransactionID"], 5);
    assert_eq!(reply["DevEUI"], 0x7ABE_1B8C_93D7_174F_u64);
    assert_eq!(reply["MIC"], 0xAA59_5854_u32);
}

#[tokio::test]
async fn http_401_is_unauthorized() {
    let (listener, addr) = local_listener().await;
    let server = raw_http_server(
        listener,
        "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    let manager: UpstreamConnectionManager = UpstreamConnectionManager::websocket(endpoint(addr), "wrong");

    let err = tokio::time::timeout(DEADLINE, manager.create_connection(1))
        .await
        .expect("handshake in time")
        .expect_err("unauthorized");

    assert!(matches!(err, StreamError::HandshakeUnauthorized));
    server.await.expect("server task");
}

#[tokio::test]
async fn unexpected_status_is_a_handshake_failure() {
    let (listener, addr) = local_listener().await;
    let server = raw_http_server(
        listener,
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    let manager: UpstreamConnectionManager = UpstreamConnectionManager::websocket(endpoint(addr), "token");

    let err = tokio::time::timeout(DEADLINE, manager.create_connection(1))
        .await
        .expect("handshake in time")
        .expect_err("service unavailable");

    assert!(matches!(
        &err,
        StreamError::ClosedAbnormally(reason) if reason
            == "Connection closed due to unhandled handshake error: \
                handshake failed with status 503: Service Unavailable"
    ));
    server.await.expect("server task");
}

#[tokio::test]
async fn refused_connection_is_a_network_failure() {
    let (listener, addr) = local_listener().await;
    drop(listener);
    let manager: UpstreamConnectionManager = UpstreamConnectionManager::websocket(endpoint(addr), "token");

    let err = tokio::time::timeout(DEADLINE, manager.create_connection(1))
        .await
        .expect("attempt in time")
        .expect_err("refused");

    assert!(matches!(
        &err,
        StreamError::ClosedAbnormally(reason) if reason.starts_with("Connection closed due to ")
    ));
}
