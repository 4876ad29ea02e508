//! Stream flavours.
//!
//! A [`Profile`] fixes which messages a connection may send and which it
//! decodes, letting one connection implementation serve both streams.

use serde::{Serialize, de::DeserializeOwned};

use crate::domain::{DownstreamEvent, DownstreamRequest, UpstreamMessage, UpstreamReply, Validate};

/// Message types and log name of a stream flavour.
pub trait Profile: Send + Sync + 'static {
    /// Value of the `stream` field on log events.
    const NAME: &'static str;
    /// Messages a client may send.
    type Outbound: Serialize + Validate + Send + Sync;
    /// Messages decoded from the service.
    type Inbound: DeserializeOwned + Validate + Send + 'static;
}

/// Uplinks pushed by the service, answered with acks or rejects.
#[derive(Clone, Copy, Debug, Default)]
pub struct Upstream;

impl Profile for Upstream {
    const NAME: &'static str = "upstream";
    type Outbound = UpstreamReply;
    type Inbound = UpstreamMessage;
}

/// Downlinks sent by the client, answered with acks and results.
#[derive(Clone, Copy, Debug, Default)]
pub struct Downstream;

impl Profile for Downstream {
    const NAME: &'static str = "downstream";
    type Outbound = DownstreamRequest;
    type Inbound = DownstreamEvent;
}
