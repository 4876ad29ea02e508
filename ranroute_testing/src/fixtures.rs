//! Sample messages and connection builders.

use std::sync::Arc;

use ranroute::{
    ConnectionConfig,
    Profile,
    StreamingConnection,
    domain::{
        DownstreamAckMessage,
        DownstreamEvent,
        DownstreamRadio,
        DownstreamResultCode,
        DownstreamResultMessage,
        LoRaModulation,
        Modulation,
        ModulationFields,
        TransmissionWindow,
        UpstreamMessage,
        UpstreamRadio,
    },
};
use rstest::fixture;
use url::Url;

use crate::MockTransport;

/// Access token presented by connections built in tests.
pub const TEST_TOKEN: &str = "test-token";

/// Endpoint used by connections built in tests.
///
/// # Panics
///
/// Panics if `path` does not form a valid URL.
#[must_use]
pub fn test_endpoint(path: &str) -> Url {
    Url::parse("ws://routing.test/")
        .and_then(|base| base.join(path))
        .expect("valid test endpoint")
}

/// A fresh scripted transport.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn mock_transport() -> MockTransport { MockTransport::new() }

/// Build an unopened connection over `transport`.
#[must_use]
pub fn connection_over<P: Profile>(
    transport: &MockTransport,
    config: ConnectionConfig,
) -> StreamingConnection<P> {
    StreamingConnection::new(
        Arc::new(transport.clone()),
        test_endpoint(P::NAME),
        TEST_TOKEN,
        config,
    )
}

fn lora() -> LoRaModulation {
    LoRaModulation {
        spreading: 7,
        bandwidth: 125_000,
    }
}

/// A valid uplink for `transaction_id`.
#[must_use]
pub fn upstream_message(transaction_id: u64) -> UpstreamMessage {
    UpstreamMessage {
        protocol_version: 1,
        transaction_id,
        outdated: None,
        dev_euis: vec![0x7ABE_1B8C_93D7_174F],
        radio: UpstreamRadio {
            frequency: 868_100_000,
            modulation: ModulationFields::from(Modulation::LoRa(lora())),
            rssi: -50.0,
            snr: 2.0,
        },
        phy_payload_no_mic: vec![0, 244, 104, 43],
        mic_challenge: vec![0xAA59_5854],
        gps: None,
    }
}

/// A class A transmission window one second after the uplink.
#[must_use]
pub fn tx_window() -> TransmissionWindow {
    TransmissionWindow::delay(DownstreamRadio::new(868_300_000, Modulation::LoRa(lora())), 1)
}

/// The service's acknowledgement of downlink `transaction_id`.
#[must_use]
pub fn downstream_ack(transaction_id: u64) -> DownstreamEvent {
    DownstreamEvent::Ack(DownstreamAckMessage {
        protocol_version: 1,
        transaction_id,
        mailbox_id: transaction_id + 100,
    })
}

/// The final result of downlink `transaction_id`.
#[must_use]
pub fn downstream_result(transaction_id: u64, result_code: DownstreamResultCode) -> DownstreamEvent {
    DownstreamEvent::Result(DownstreamResultMessage {
        protocol_version: 1,
        transaction_id,
        result_code,
        result_message: format!("{result_code:?}"),
        mailbox_id: transaction_id + 100,
    })
}
