//! A full inbound buffer suspends the listener instead of dropping frames.

use std::time::Duration;

use futures::StreamExt;
use ranroute::{CloseReason, ConnectionConfig, StreamError, Upstream, UpstreamConnection};
use ranroute_testing::{MockTransport, connection_over, mock_transport, upstream_message};
use rstest::rstest;

fn single_slot(transport: &MockTransport) -> UpstreamConnection {
    connection_over::<Upstream>(transport, ConnectionConfig::new().buffer_capacity(1))
}

async fn received_id(connection: &UpstreamConnection) -> u64 {
    connection
        .recv(Some(Duration::from_secs(5)))
        .await
        .expect("recv")
        .expect("message before timeout")
        .transaction_id
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn listener_waits_for_consumer(mock_transport: MockTransport) {
    for transaction_id in 1..=3 {
        mock_transport.push_message(&upstream_message(transaction_id));
    }
    let connection = single_slot(&mock_transport);
    connection.connect().await.expect("connect");

    // First frame buffered, second held by the listener, third unread.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(mock_transport.pending_events(), 1);
    assert!(connection.is_opened());

    assert_eq!(received_id(&connection).await, 1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(mock_transport.pending_events(), 0);

    assert_eq!(received_id(&connection).await, 2);
    assert_eq!(received_id(&connection).await, 3);
    assert!(
        connection
            .recv(Some(Duration::from_secs(1)))
            .await
            .expect("open connection")
            .is_none()
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn close_releases_blocked_listener(mock_transport: MockTransport) {
    for transaction_id in 1..=2 {
        mock_transport.push_message(&upstream_message(transaction_id));
    }
    let connection = single_slot(&mock_transport);
    connection.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(mock_transport.pending_events(), 0);

    connection.close();

    assert_eq!(
        connection.wait_closed().await.expect("wait closed"),
        CloseReason::Graceful
    );
    assert_eq!(received_id(&connection).await, 1);
    assert_eq!(received_id(&connection).await, 2);
    assert!(matches!(
        connection.recv(None).await,
        Err(StreamError::ClosedOk)
    ));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stream_drains_message_held_at_close(mock_transport: MockTransport) {
    for transaction_id in 1..=3 {
        mock_transport.push_message(&upstream_message(transaction_id));
    }
    let connection = single_slot(&mock_transport);
    connection.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(1)).await;

    connection.close();
    connection.wait_closed().await.expect("wait closed");
    let ids: Vec<u64> = connection
        .stream()
        .map(|message| message.transaction_id)
        .collect()
        .await;

    assert_eq!(ids, vec![1, 2]);
    assert_eq!(mock_transport.pending_events(), 1);
}
