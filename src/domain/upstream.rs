//! Messages carried by the upstream stream.

use serde::{Deserialize, Serialize};

use super::{Gps, PROTOCOL_VERSION, ParameterError, UpstreamRadio, Validate, validate_header};

/// An uplink pushed by the routing service.
///
/// The MIC is withheld: the receiver must solve the MIC challenge and reply
/// with an [`UpstreamAckMessage`] or an [`UpstreamRejectMessage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpstreamMessage {
    pub protocol_version: u32,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outdated: Option<bool>,
    #[serde(rename = "DevEUIs")]
    pub dev_euis: Vec<u64>,
    pub radio: UpstreamRadio,
    #[serde(rename = "PHYPayloadNoMIC")]
    pub phy_payload_no_mic: Vec<u8>,
    #[serde(rename = "MICChallenge")]
    pub mic_challenge: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<Gps>,
}

impl Validate for UpstreamMessage {
    fn validate(&self) -> Result<(), ParameterError> {
        validate_header(self.protocol_version, self.transaction_id)?;
        self.radio.modulation.validate()
    }
}

/// Acknowledges an uplink with the device and MIC that solved its challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpstreamAckMessage {
    pub protocol_version: u32,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u64,
    #[serde(rename = "DevEUI")]
    pub dev_eui: u64,
    #[serde(rename = "MIC")]
    pub mic: u32,
}

impl UpstreamAckMessage {
    /// Build an acknowledgement stamped with [`PROTOCOL_VERSION`].
    #[must_use]
    pub fn new(transaction_id: u64, dev_eui: u64, mic: u32) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            dev_eui,
            mic,
        }
    }
}

impl Validate for UpstreamAckMessage {
    fn validate(&self) -> Result<(), ParameterError> {
        validate_header(self.protocol_version, self.transaction_id)
    }
}

/// Why an uplink was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamRejectResultCode {
    /// No candidate device produced a matching MIC.
    #[serde(rename = "MICFailed")]
    MicFailed,
    Other,
}

/// Rejects an uplink. Sent instead of, never in addition to, an ack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpstreamRejectMessage {
    pub protocol_version: u32,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u64,
    pub result_code: UpstreamRejectResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_message: Option<String>,
}

impl UpstreamRejectMessage {
    /// Build a rejection stamped with [`PROTOCOL_VERSION`].
    #[must_use]
    pub fn new(transaction_id: u64, result_code: UpstreamRejectResultCode) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            result_code,
            result_message: None,
        }
    }
}

impl Validate for UpstreamRejectMessage {
    fn validate(&self) -> Result<(), ParameterError> {
        validate_header(self.protocol_version, self.transaction_id)
    }
}

/// Anything a client may send on the upstream stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UpstreamReply {
    Ack(UpstreamAckMessage),
    Reject(UpstreamRejectMessage),
}

impl Validate for UpstreamReply {
    fn validate(&self) -> Result<(), ParameterError> {
        match self {
            Self::Ack(ack) => ack.validate(),
            Self::Reject(reject) => reject.validate(),
        }
    }
}

impl From<UpstreamAckMessage> for UpstreamReply {
    fn from(value: UpstreamAckMessage) -> Self { Self::Ack(value) }
}

impl From<UpstreamRejectMessage> for UpstreamReply {
    fn from(value: UpstreamRejectMessage) -> Self { Self::Reject(value) }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ack_serializes_with_wire_keys() {
        let ack = UpstreamReply::from(UpstreamAckMessage::new(1, 2, 3));
        let text = serde_json::to_string(&ack).expect("serialize ack");
        assert_eq!(
            text,
            r#"{"ProtocolVersion":1,"TransactionID":1,"DevEUI":2,"MIC":3}"#
        );
    }

    #[test]
    fn reject_omits_absent_message() {
        let reject = UpstreamRejectMessage::new(1, UpstreamRejectResultCode::MicFailed);
        let value = serde_json::to_value(&reject).expect("serialize reject");
        assert_eq!(
            value,
            json!({"ProtocolVersion": 1, "TransactionID": 1, "ResultCode": "MICFailed"})
        );
    }

    #[test]
    fn uplink_decodes_from_wire_keys() {
        let wire = json!({
            "ProtocolVersion": 1,
            "TransactionID": 9,
            "DevEUIs": [0x7ABE_1B8C_93D7_174F_u64],
            "Radio": {
                "Frequency": 868_100_000,
                "LoRa": {"Spreading": 12, "Bandwidth": 125_000},
                "RSSI": -50.0,
                "SNR": 2.0
            },
            "PHYPayloadNoMIC": [0, 244, 104],
            "MICChallenge": [0xAA59_5854_u32],
            "Gps": {"Lat": 51.178_889, "Lng": -1.826_111}
        });
        let message: UpstreamMessage = serde_json::from_value(wire).expect("decode uplink");
        assert_eq!(message.transaction_id, 9);
        assert_eq!(message.phy_payload_no_mic, vec![0, 244, 104]);
        assert_eq!(message.gps.and_then(|gps| gps.alt), None);
        assert_eq!(message.validate(), Ok(()));
    }

    #[test]
    fn zero_transaction_id_is_rejected() {
        let err = UpstreamAckMessage::new(0, 1, 1)
            .validate()
            .expect_err("zero transaction id");
        assert_eq!(err.field(), "transaction_id");
    }
}
