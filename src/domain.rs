//! Typed messages exchanged over the upstream and downstream streams.
//!
//! Field names follow Rust conventions and are mapped to the service's
//! capitalised wire keys (`TransactionID`, `DevEUI`, `PHYPayload`, ...)
//! through serde attributes, so the translation is lossless in both
//! directions. Optional fields that are unset are omitted when encoding.

mod downstream;
mod error;
mod radio;
mod upstream;

pub use downstream::{
    DownstreamAckMessage,
    DownstreamEvent,
    DownstreamMessage,
    DownstreamRequest,
    DownstreamResultCode,
    DownstreamResultMessage,
    MulticastDownstreamMessage,
    TransmissionWindow,
};
pub use error::ParameterError;
pub use radio::{
    DownstreamRadio,
    FhssModulation,
    FskModulation,
    Gps,
    LoRaModulation,
    MAX_SPREADING_FACTOR,
    Modulation,
    ModulationFields,
    UpstreamRadio,
};
pub use upstream::{
    UpstreamAckMessage,
    UpstreamMessage,
    UpstreamRejectMessage,
    UpstreamRejectResultCode,
    UpstreamReply,
};

/// Protocol version stamped on messages built by the convenience senders.
pub const PROTOCOL_VERSION: u32 = 1;

/// Semantic checks applied to messages before sending and after decoding.
pub trait Validate {
    /// Check every constraint the message type carries.
    ///
    /// # Errors
    ///
    /// Returns the first [`ParameterError`] encountered.
    fn validate(&self) -> Result<(), ParameterError>;
}

/// Validate the header fields every stream message carries.
pub(crate) fn validate_header(
    protocol_version: u32,
    transaction_id: u64,
) -> Result<(), ParameterError> {
    if protocol_version == 0 {
        return Err(ParameterError::new(
            "protocol_version",
            "must be greater than zero",
        ));
    }
    if transaction_id == 0 {
        return Err(ParameterError::new(
            "transaction_id",
            "must be greater than zero",
        ));
    }
    Ok(())
}
