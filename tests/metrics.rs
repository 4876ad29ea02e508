#![cfg(feature = "metrics")]
//! Tests for `ranroute` metrics helpers.
//!
//! Counters and gauges are observed through
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use ranroute::{
    ConnectionConfig,
    Upstream,
    metrics::{self as stream_metrics, Direction},
};
use ranroute_testing::{MockTransport, connection_over, upstream_message};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

type Entries = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

fn counter(entries: &Entries, name: &str, direction: Option<&str>) -> u64 {
    entries
        .iter()
        .filter(|(k, _, _, _)| k.key().name() == name)
        .filter(|(k, _, _, _)| {
            direction.is_none_or(|d| {
                k.key()
                    .labels()
                    .any(|l| l.key() == "direction" && l.value() == d)
            })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => *c,
            _ => 0,
        })
        .sum()
}

fn gauge(entries: &Entries, name: &str) -> Option<f64> {
    entries.iter().find_map(|(k, _, _, v)| match v {
        DebugValue::Gauge(g) if k.key().name() == name => Some(g.into_inner()),
        _ => None,
    })
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || stream_metrics::inc_frames(direction));

    let entries = snapshotter.snapshot().into_vec();
    assert_eq!(counter(&entries, stream_metrics::FRAMES_TOTAL, Some(label)), 1);
}

#[rstest]
#[case(1)]
#[case(3)]
fn decode_error_metric_counts(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| stream_metrics::inc_decode_errors());
    });

    let entries = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter(&entries, stream_metrics::DECODE_ERRORS_TOTAL, None),
        expected
    );
}

#[test]
fn connection_gauge_returns_to_zero() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        stream_metrics::inc_connections();
        stream_metrics::inc_connections();
        stream_metrics::dec_connections();
    });
    assert_eq!(
        gauge(&snapshotter.snapshot().into_vec(), stream_metrics::CONNECTIONS_OPEN),
        Some(1.0)
    );
}

#[test]
fn connection_traffic_is_recorded() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let _local = metrics::set_default_local_recorder(&recorder);
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("runtime");

    rt.block_on(async {
        let transport = MockTransport::new();
        transport.push_message(&upstream_message(1));
        transport.push_text("not json");
        transport.push_message(&upstream_message(2));
        let connection = connection_over::<Upstream>(&transport, ConnectionConfig::default());
        connection.connect().await.expect("connect");
        for expected in 1..=2 {
            let message = connection.recv(None).await.expect("recv");
            assert_eq!(message.map(|m| m.transaction_id), Some(expected));
        }
        connection
            .send_upstream_ack(1, 0x7ABE_1B8C_93D7_174F, 0xAA59_5854)
            .await
            .expect("send ack");
        transport.push_close(1000, "");
        connection.wait_closed().await.expect("closed");
    });

    let entries = snapshotter.snapshot().into_vec();
    assert_eq!(counter(&entries, stream_metrics::FRAMES_TOTAL, Some("inbound")), 3);
    assert_eq!(counter(&entries, stream_metrics::FRAMES_TOTAL, Some("outbound")), 1);
    assert_eq!(counter(&entries, stream_metrics::DECODE_ERRORS_TOTAL, None), 1);
    assert_eq!(gauge(&entries, stream_metrics::CONNECTIONS_OPEN), Some(0.0));
}
