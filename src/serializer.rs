//! Message serialization traits.
//!
//! This module defines the [`Serializer`] trait used by a streaming
//! connection to turn typed messages into [`Frame`]s and back. A
//! [`JsonSerializer`] implementation is provided as the default.

use std::error::Error;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{domain::ParameterError, frame::Frame};

/// Errors raised while encoding or decoding a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] Box<dyn Error + Send + Sync>),
    /// The frame did not contain a well-formed message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] Box<dyn Error + Send + Sync>),
    /// The message was well formed but failed validation.
    #[error(transparent)]
    Invalid(#[from] ParameterError),
}

/// Trait for serializing and deserializing messages.
///
/// # Object Safety
///
/// This trait is not object-safe. Its methods carry `Self: Sized` bounds, so
/// connections are generic over the concrete serializer instead.
pub trait Serializer: Send + Sync + 'static {
    /// Serialize `value` into a frame ready for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the value cannot be serialized.
    fn serialize<M>(&self, value: &M) -> Result<Frame, CodecError>
    where
        M: Serialize,
        Self: Sized;

    /// Deserialize a message from `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the frame cannot be parsed into `M`.
    fn deserialize<M>(&self, frame: &Frame) -> Result<M, CodecError>
    where
        M: DeserializeOwned,
        Self: Sized;
}

/// Serializer encoding messages as JSON text frames.
///
/// Binary frames are accepted on decode as long as they hold UTF-8 JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<M>(&self, value: &M) -> Result<Frame, CodecError>
    where
        M: Serialize,
    {
        serde_json::to_string(value)
            .map(Frame::Text)
            .map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn deserialize<M>(&self, frame: &Frame) -> Result<M, CodecError>
    where
        M: DeserializeOwned,
    {
        serde_json::from_slice(frame.as_bytes()).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
