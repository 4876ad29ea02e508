//! Radio parameters shared by upstream and downstream messages.

use serde::{Deserialize, Serialize};

use super::{ParameterError, Validate};

/// Highest LoRa spreading factor accepted on the wire.
pub const MAX_SPREADING_FACTOR: u8 = 12;

/// LoRa modulation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoRaModulation {
    pub spreading: u8,
    pub bandwidth: u32,
}

/// FSK modulation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FskModulation {
    pub frequency_deviation: u32,
    pub bit_rate: u32,
}

/// LR-FHSS modulation parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FhssModulation {
    pub ocw: u32,
    pub coding_rate: String,
}

/// The modulation a radio frame was received or must be sent with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modulation {
    LoRa(LoRaModulation),
    Fsk(FskModulation),
    Fhss(FhssModulation),
}

/// Wire representation of a modulation: one optional key per scheme.
///
/// Exactly one key must be present for the radio to be valid; see
/// [`ModulationFields::modulation`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulationFields {
    #[serde(rename = "LoRa", default, skip_serializing_if = "Option::is_none")]
    pub lora: Option<LoRaModulation>,
    #[serde(rename = "FSK", default, skip_serializing_if = "Option::is_none")]
    pub fsk: Option<FskModulation>,
    #[serde(rename = "FHSS", default, skip_serializing_if = "Option::is_none")]
    pub fhss: Option<FhssModulation>,
}

impl ModulationFields {
    /// Return the single configured modulation.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when no scheme or more than one scheme is
    /// present.
    pub fn modulation(&self) -> Result<Modulation, ParameterError> {
        match (&self.lora, &self.fsk, &self.fhss) {
            (Some(lora), None, None) => Ok(Modulation::LoRa(*lora)),
            (None, Some(fsk), None) => Ok(Modulation::Fsk(*fsk)),
            (None, None, Some(fhss)) => Ok(Modulation::Fhss(fhss.clone())),
            _ => Err(ParameterError::new(
                "radio",
                "one and only one type of modulation must be present",
            )),
        }
    }
}

impl From<Modulation> for ModulationFields {
    fn from(value: Modulation) -> Self {
        match value {
            Modulation::LoRa(lora) => Self {
                lora: Some(lora),
                ..Self::default()
            },
            Modulation::Fsk(fsk) => Self {
                fsk: Some(fsk),
                ..Self::default()
            },
            Modulation::Fhss(fhss) => Self {
                fhss: Some(fhss),
                ..Self::default()
            },
        }
    }
}

impl Validate for ModulationFields {
    fn validate(&self) -> Result<(), ParameterError> {
        match self.modulation()? {
            Modulation::LoRa(lora) if lora.spreading > MAX_SPREADING_FACTOR => Err(
                ParameterError::new("spreading", format!("must be at most {MAX_SPREADING_FACTOR}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Radio metadata attached to a received uplink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpstreamRadio {
    pub frequency: u64,
    #[serde(flatten)]
    pub modulation: ModulationFields,
    #[serde(rename = "RSSI")]
    pub rssi: f64,
    #[serde(rename = "SNR")]
    pub snr: f64,
}

/// Radio parameters for a scheduled downlink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownstreamRadio {
    pub frequency: u64,
    #[serde(flatten)]
    pub modulation: ModulationFields,
}

impl DownstreamRadio {
    /// Build downlink radio parameters for a single modulation.
    #[must_use]
    pub fn new(frequency: u64, modulation: Modulation) -> Self {
        Self {
            frequency,
            modulation: modulation.into(),
        }
    }
}

/// Receiving gateway position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Gps {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn lora(spreading: u8) -> LoRaModulation {
        LoRaModulation {
            spreading,
            bandwidth: 125_000,
        }
    }

    #[test]
    fn single_modulation_is_accepted() {
        let fields = ModulationFields::from(Modulation::LoRa(lora(7)));
        assert_eq!(fields.validate(), Ok(()));
        assert_eq!(fields.modulation(), Ok(Modulation::LoRa(lora(7))));
    }

    #[rstest]
    #[case(ModulationFields::default())]
    #[case(ModulationFields {
        lora: Some(lora(7)),
        fsk: Some(FskModulation { frequency_deviation: 1, bit_rate: 1 }),
        fhss: None,
    })]
    fn modulation_count_must_be_one(#[case] fields: ModulationFields) {
        let err = fields.validate().expect_err("invalid modulation set");
        assert_eq!(err.field(), "radio");
    }

    #[test]
    fn spreading_factor_is_bounded() {
        let fields = ModulationFields::from(Modulation::LoRa(lora(13)));
        let err = fields.validate().expect_err("spreading factor too high");
        assert_eq!(err.field(), "spreading");
    }

    #[test]
    fn radio_uses_wire_keys() {
        let radio = DownstreamRadio::new(868_300_000, Modulation::LoRa(lora(12)));
        let value = serde_json::to_value(&radio).expect("serialize radio");
        assert_eq!(
            value,
            json!({"Frequency": 868_300_000, "LoRa": {"Spreading": 12, "Bandwidth": 125_000}})
        );
    }
}
