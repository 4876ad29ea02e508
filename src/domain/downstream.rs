//! Messages carried by the downstream stream.

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};

use super::{DownstreamRadio, PROTOCOL_VERSION, ParameterError, Validate, validate_header};

/// Wire key whose presence marks a downstream result rather than an ack.
const RESULT_CODE_KEY: &str = "ResultCode";

/// Longest RX delay, in seconds, a class A window may request.
const MAX_DELAY: u8 = 15;

/// When a downlink should be transmitted.
///
/// Exactly one of `delay` (class A, seconds after the uplink), `tmms`
/// (class B, GPS epoch milliseconds) or `deadline` (class C, seconds) must be
/// set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransmissionWindow {
    pub radio: DownstreamRadio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmms: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
}

impl TransmissionWindow {
    /// Class A window opening `delay` seconds after the uplink.
    #[must_use]
    pub fn delay(radio: DownstreamRadio, delay: u8) -> Self {
        Self {
            radio,
            delay: Some(delay),
            tmms: None,
            deadline: None,
        }
    }

    /// Class B window at the given GPS epoch timestamps.
    #[must_use]
    pub fn tmms(radio: DownstreamRadio, tmms: Vec<u64>) -> Self {
        Self {
            radio,
            delay: None,
            tmms: Some(tmms),
            deadline: None,
        }
    }

    /// Class C window that must be used before `deadline` seconds elapse.
    #[must_use]
    pub fn deadline(radio: DownstreamRadio, deadline: u64) -> Self {
        Self {
            radio,
            delay: None,
            tmms: None,
            deadline: Some(deadline),
        }
    }
}

impl Validate for TransmissionWindow {
    fn validate(&self) -> Result<(), ParameterError> {
        self.radio.modulation.validate()?;
        match (&self.delay, &self.tmms, &self.deadline) {
            (Some(delay), None, None) if (1..=MAX_DELAY).contains(delay) => Ok(()),
            (Some(_), None, None) => Err(ParameterError::new(
                "delay",
                format!("must be between 1 and {MAX_DELAY}"),
            )),
            (None, Some(tmms), None) if tmms.is_empty() => {
                Err(ParameterError::new("tmms", "must not be empty"))
            }
            (None, None, Some(0)) => Err(ParameterError::new(
                "deadline",
                "must be greater than zero",
            )),
            (None, Some(_), None) | (None, None, Some(_)) => Ok(()),
            _ => Err(ParameterError::new(
                "tx_window",
                "one and only one of delay, tmms or deadline must be present",
            )),
        }
    }
}

/// A unicast downlink addressed to one device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownstreamMessage {
    pub protocol_version: u32,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u64,
    #[serde(rename = "DevEUI")]
    pub dev_eui: u64,
    /// Required for join-accepts so the routing table can be updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dev_addr: Option<u32>,
    pub tx_window: TransmissionWindow,
    #[serde(rename = "PHYPayload")]
    pub phy_payload: Vec<u8>,
}

impl DownstreamMessage {
    /// Build a downlink stamped with [`PROTOCOL_VERSION`].
    #[must_use]
    pub fn new(
        transaction_id: u64,
        dev_eui: u64,
        tx_window: TransmissionWindow,
        phy_payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            dev_eui,
            target_dev_addr: None,
            tx_window,
            phy_payload: phy_payload.into(),
        }
    }

    /// Attach the device address assigned by a join-accept.
    #[must_use]
    pub fn with_target_dev_addr(mut self, target_dev_addr: Option<u32>) -> Self {
        self.target_dev_addr = target_dev_addr;
        self
    }
}

impl Validate for DownstreamMessage {
    fn validate(&self) -> Result<(), ParameterError> {
        validate_header(self.protocol_version, self.transaction_id)?;
        self.tx_window.validate()
    }
}

/// A downlink addressed to a multicast group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MulticastDownstreamMessage {
    pub protocol_version: u32,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u64,
    pub addr: u32,
    pub tx_window: TransmissionWindow,
    #[serde(rename = "PHYPayload")]
    pub phy_payload: Vec<u8>,
}

impl MulticastDownstreamMessage {
    /// Build a multicast downlink stamped with [`PROTOCOL_VERSION`].
    #[must_use]
    pub fn new(
        transaction_id: u64,
        addr: u32,
        tx_window: TransmissionWindow,
        phy_payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            addr,
            tx_window,
            phy_payload: phy_payload.into(),
        }
    }
}

impl Validate for MulticastDownstreamMessage {
    fn validate(&self) -> Result<(), ParameterError> {
        validate_header(self.protocol_version, self.transaction_id)?;
        self.tx_window.validate()
    }
}

/// Anything a client may send on the downstream stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DownstreamRequest {
    Unicast(DownstreamMessage),
    Multicast(MulticastDownstreamMessage),
}

impl Validate for DownstreamRequest {
    fn validate(&self) -> Result<(), ParameterError> {
        match self {
            Self::Unicast(message) => message.validate(),
            Self::Multicast(message) => message.validate(),
        }
    }
}

impl From<DownstreamMessage> for DownstreamRequest {
    fn from(value: DownstreamMessage) -> Self { Self::Unicast(value) }
}

impl From<MulticastDownstreamMessage> for DownstreamRequest {
    fn from(value: MulticastDownstreamMessage) -> Self { Self::Multicast(value) }
}

/// Outcome of a downlink transmission attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownstreamResultCode {
    Success,
    WindowNotFound,
    GatewayNotFound,
    TooLate,
    NoAck,
    GatewayError,
}

fn validate_mailbox(mailbox_id: u64) -> Result<(), ParameterError> {
    if mailbox_id == 0 {
        return Err(ParameterError::new("mailbox_id", "must be greater than zero"));
    }
    Ok(())
}

/// The service accepted a downlink for scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownstreamAckMessage {
    pub protocol_version: u32,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u64,
    #[serde(rename = "MailboxID")]
    pub mailbox_id: u64,
}

impl Validate for DownstreamAckMessage {
    fn validate(&self) -> Result<(), ParameterError> {
        validate_header(self.protocol_version, self.transaction_id)?;
        validate_mailbox(self.mailbox_id)
    }
}

/// Final result of a downlink transmission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownstreamResultMessage {
    pub protocol_version: u32,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u64,
    pub result_code: DownstreamResultCode,
    pub result_message: String,
    #[serde(rename = "MailboxID")]
    pub mailbox_id: u64,
}

impl Validate for DownstreamResultMessage {
    fn validate(&self) -> Result<(), ParameterError> {
        validate_header(self.protocol_version, self.transaction_id)?;
        validate_mailbox(self.mailbox_id)
    }
}

/// Anything the service sends back on the downstream stream.
///
/// Decoding selects [`DownstreamEvent::Result`] when the frame carries a
/// `ResultCode` key and [`DownstreamEvent::Ack`] otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DownstreamEvent {
    Ack(DownstreamAckMessage),
    Result(DownstreamResultMessage),
}

impl DownstreamEvent {
    /// Transaction the event refers to.
    #[must_use]
    pub fn transaction_id(&self) -> u64 {
        match self {
            Self::Ack(ack) => ack.transaction_id,
            Self::Result(result) => result.transaction_id,
        }
    }
}

impl<'de> Deserialize<'de> for DownstreamEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.get(RESULT_CODE_KEY).is_some() {
            DownstreamResultMessage::deserialize(value)
                .map(Self::Result)
                .map_err(D::Error::custom)
        } else {
            DownstreamAckMessage::deserialize(value)
                .map(Self::Ack)
                .map_err(D::Error::custom)
        }
    }
}

impl Validate for DownstreamEvent {
    fn validate(&self) -> Result<(), ParameterError> {
        match self {
            Self::Ack(ack) => ack.validate(),
            Self::Result(result) => result.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::domain::{LoRaModulation, Modulation};

    fn radio() -> DownstreamRadio {
        DownstreamRadio::new(
            868_300_000,
            Modulation::LoRa(LoRaModulation {
                spreading: 7,
                bandwidth: 125_000,
            }),
        )
    }

    #[test]
    fn event_with_result_code_decodes_as_result() {
        let wire = json!({
            "ProtocolVersion": 1,
            "TransactionID": 5,
            "ResultCode": "TooLate",
            "ResultMessage": "window missed",
            "MailboxID": 3
        });
        let event: DownstreamEvent = serde_json::from_value(wire).expect("decode result");
        let DownstreamEvent::Result(result) = event else {
            panic!("expected a result event");
        };
        assert_eq!(result.result_code, DownstreamResultCode::TooLate);
        assert_eq!(result.mailbox_id, 3);
    }

    #[test]
    fn event_without_result_code_decodes_as_ack() {
        let wire = json!({"ProtocolVersion": 1, "TransactionID": 5, "MailboxID": 3});
        let event: DownstreamEvent = serde_json::from_value(wire).expect("decode ack");
        assert!(matches!(event, DownstreamEvent::Ack(ack) if ack.transaction_id == 5));
    }

    #[test]
    fn incomplete_result_is_not_mistaken_for_ack() {
        let wire = json!({
            "ProtocolVersion": 1,
            "TransactionID": 5,
            "ResultCode": "Success",
            "MailboxID": 3
        });
        assert!(serde_json::from_value::<DownstreamEvent>(wire).is_err());
    }

    #[rstest]
    #[case(json!({"ProtocolVersion": 1, "TransactionID": 5, "MailboxID": 0}))]
    #[case(json!({
        "ProtocolVersion": 1,
        "TransactionID": 5,
        "ResultCode": "Success",
        "ResultMessage": "sent",
        "MailboxID": 0
    }))]
    fn zero_mailbox_is_invalid(#[case] wire: serde_json::Value) {
        let event: DownstreamEvent = serde_json::from_value(wire).expect("decode event");
        assert_eq!(event.validate().err().map(|err| err.field()), Some("mailbox_id"));
    }

    #[rstest]
    #[case(TransmissionWindow::delay(radio(), 1), None)]
    #[case(TransmissionWindow::delay(radio(), 0), Some("delay"))]
    #[case(TransmissionWindow::delay(radio(), 16), Some("delay"))]
    #[case(TransmissionWindow::tmms(radio(), vec![]), Some("tmms"))]
    #[case(TransmissionWindow::tmms(radio(), vec![1_000]), None)]
    #[case(TransmissionWindow::deadline(radio(), 0), Some("deadline"))]
    #[case(TransmissionWindow::deadline(radio(), 30), None)]
    #[case(
        TransmissionWindow { deadline: Some(30), ..TransmissionWindow::delay(radio(), 1) },
        Some("tx_window")
    )]
    fn transmission_window_constraints(
        #[case] window: TransmissionWindow,
        #[case] failing_field: Option<&str>,
    ) {
        assert_eq!(window.validate().err().map(|err| err.field()), failing_field);
    }

    #[test]
    fn downlink_serializes_with_wire_keys() {
        let message = DownstreamMessage::new(1, 42, TransmissionWindow::delay(radio(), 1), *b"hi");
        let value = serde_json::to_value(DownstreamRequest::from(message)).expect("serialize");
        assert_eq!(
            value,
            json!({
                "ProtocolVersion": 1,
                "TransactionID": 1,
                "DevEUI": 42,
                "TxWindow": {
                    "Radio": {
                        "Frequency": 868_300_000,
                        "LoRa": {"Spreading": 7, "Bandwidth": 125_000}
                    },
                    "Delay": 1
                },
                "PHYPayload": [104, 105]
            })
        );
    }
}
