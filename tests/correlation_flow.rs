//! Correlating downlink acks and results delivered on a downstream stream.

use std::time::Duration;

use ranroute::{
    ConnectionConfig,
    CorrelationError,
    CorrelationTracker,
    Downstream,
    ReplyKind,
    domain::{DownstreamEvent, DownstreamResultCode},
};
use ranroute_testing::{
    MockTransport,
    connection_over,
    downstream_ack,
    downstream_result,
    mock_transport,
    tx_window,
};
use rstest::rstest;

#[rstest]
#[tokio::test(start_paused = true)]
async fn replies_resolve_their_waiters(mock_transport: MockTransport) {
    let connection = connection_over::<Downstream>(&mock_transport, ConnectionConfig::default());
    connection.connect().await.expect("connect");
    let tracker = CorrelationTracker::<DownstreamEvent>::new();
    let ack = tracker.register(42, ReplyKind::Ack).expect("register ack");
    let result = tracker.register(42, ReplyKind::Result).expect("register result");
    let pump = {
        let tracker = tracker.clone();
        let replies = connection.stream();
        tokio::spawn(async move { tracker.pump(replies).await })
    };

    connection
        .send_downstream(42, 0x0102_0304_0506_0708, tx_window(), vec![1, 2, 3], None)
        .await
        .expect("send downlink");
    mock_transport.push_message(&downstream_ack(99));
    mock_transport.push_message(&downstream_ack(42));
    mock_transport.push_message(&downstream_result(42, DownstreamResultCode::TooLate));

    assert_eq!(ack.wait().await, Ok(downstream_ack(42)));
    let outcome = result
        .wait_timeout(Duration::from_secs(30))
        .await
        .expect("result");
    assert!(
        matches!(outcome, DownstreamEvent::Result(ref r) if r.result_code == DownstreamResultCode::TooLate)
    );

    mock_transport.push_close(1000, "");
    assert_eq!(pump.await.expect("pump task"), 2);
    assert_eq!(tracker.pending(ReplyKind::Ack), 0);
    assert_eq!(tracker.pending(ReplyKind::Result), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_result_times_out_and_deregisters(mock_transport: MockTransport) {
    let connection = connection_over::<Downstream>(&mock_transport, ConnectionConfig::default());
    connection.connect().await.expect("connect");
    let tracker = CorrelationTracker::<DownstreamEvent>::new();
    let pump = {
        let tracker = tracker.clone();
        let replies = connection.stream();
        tokio::spawn(async move { tracker.pump(replies).await })
    };
    let result = tracker.register(7, ReplyKind::Result).expect("register");

    mock_transport.push_message(&downstream_ack(7));
    let outcome = result.wait_timeout(Duration::from_secs(5)).await;

    assert_eq!(outcome, Err(CorrelationError::Timeout));
    assert_eq!(tracker.pending(ReplyKind::Result), 0);

    mock_transport.push_message(&downstream_result(7, DownstreamResultCode::Success));
    mock_transport.push_close(1000, "");
    assert_eq!(pump.await.expect("pump task"), 0);
}
