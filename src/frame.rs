//! A single message-level frame exchanged with the service.

use bytes::Bytes;

/// Payload of one websocket data frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text, the format produced by the default serializer.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
}

impl Frame {
    /// Borrow the frame payload as bytes regardless of its kind.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.as_bytes().len() }

    /// Returns `true` if the frame carries no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl From<String> for Frame {
    fn from(value: String) -> Self { Frame::Text(value) }
}

impl From<&str> for Frame {
    fn from(value: &str) -> Self { Frame::Text(value.to_owned()) }
}

impl From<Bytes> for Frame {
    fn from(value: Bytes) -> Self { Frame::Binary(value) }
}

impl From<Vec<u8>> for Frame {
    fn from(value: Vec<u8>) -> Self { Frame::Binary(Bytes::from(value)) }
}
