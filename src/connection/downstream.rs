//! Downstream stream senders.

use super::{Downstream, StreamingConnection};
use crate::{
    domain::{DownstreamMessage, DownstreamRequest, MulticastDownstreamMessage, TransmissionWindow},
    error::StreamError,
    serializer::{JsonSerializer, Serializer},
};

/// Connection sending downlinks and receiving their acks and results.
pub type DownstreamConnection<S = JsonSerializer> = StreamingConnection<Downstream, S>;

impl<S: Serializer> StreamingConnection<Downstream, S> {
    /// Schedule a unicast downlink.
    ///
    /// `target_dev_addr` is required for join-accepts.
    ///
    /// # Errors
    ///
    /// As [`send`](StreamingConnection::send).
    pub async fn send_downstream(
        &self,
        transaction_id: u64,
        dev_eui: u64,
        tx_window: TransmissionWindow,
        phy_payload: impl Into<Vec<u8>>,
        target_dev_addr: Option<u32>,
    ) -> Result<(), StreamError> {
        let message = DownstreamMessage::new(transaction_id, dev_eui, tx_window, phy_payload)
            .with_target_dev_addr(target_dev_addr);
        self.send_downstream_object(message).await
    }

    /// Send a prebuilt unicast downlink.
    ///
    /// # Errors
    ///
    /// As [`send`](StreamingConnection::send).
    pub async fn send_downstream_object(&self, message: DownstreamMessage) -> Result<(), StreamError> {
        self.send(&DownstreamRequest::Unicast(message)).await
    }

    /// Schedule a downlink to multicast group `addr`.
    ///
    /// # Errors
    ///
    /// As [`send`](StreamingConnection::send).
    pub async fn send_multicast_downstream(
        &self,
        transaction_id: u64,
        addr: u32,
        tx_window: TransmissionWindow,
        phy_payload: impl Into<Vec<u8>>,
    ) -> Result<(), StreamError> {
        let message = MulticastDownstreamMessage::new(transaction_id, addr, tx_window, phy_payload);
        self.send_multicast_downstream_object(message).await
    }

    /// Send a prebuilt multicast downlink.
    ///
    /// # Errors
    ///
    /// As [`send`](StreamingConnection::send).
    pub async fn send_multicast_downstream_object(
        &self,
        message: MulticastDownstreamMessage,
    ) -> Result<(), StreamError> {
        self.send(&DownstreamRequest::Multicast(message)).await
    }
}
