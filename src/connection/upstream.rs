//! Upstream stream senders.

use super::{StreamingConnection, Upstream};
use crate::{
    domain::{UpstreamAckMessage, UpstreamRejectMessage, UpstreamRejectResultCode, UpstreamReply},
    error::StreamError,
    serializer::{JsonSerializer, Serializer},
};

/// Connection receiving uplinks and sending acks or rejects.
pub type UpstreamConnection<S = JsonSerializer> = StreamingConnection<Upstream, S>;

impl<S: Serializer> StreamingConnection<Upstream, S> {
    /// Acknowledge uplink `transaction_id` with the device and MIC that
    /// solved its challenge.
    ///
    /// # Errors
    ///
    /// As [`send`](StreamingConnection::send).
    pub async fn send_upstream_ack(
        &self,
        transaction_id: u64,
        dev_eui: u64,
        mic: u32,
    ) -> Result<(), StreamError> {
        let ack = UpstreamAckMessage::new(transaction_id, dev_eui, mic);
        self.send(&UpstreamReply::Ack(ack)).await
    }

    /// Reject uplink `transaction_id`.
    ///
    /// # Errors
    ///
    /// As [`send`](StreamingConnection::send).
    pub async fn send_upstream_reject(
        &self,
        transaction_id: u64,
        result_code: UpstreamRejectResultCode,
    ) -> Result<(), StreamError> {
        let reject = UpstreamRejectMessage::new(transaction_id, result_code);
        self.send(&UpstreamReply::Reject(reject)).await
    }
}
