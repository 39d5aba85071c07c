//! Serial pub/sub node
//!
//! One endpoint of a byte-oriented serial link carrying many named topics.
//! A node publishes on topics - fire-and-forget ([`PacketType::Broadcast`])
//! or acknowledged ([`PacketType::Publish`], answered by an ACK) - and runs
//! subscriber callbacks for whatever arrives. The link itself stays out of
//! scope: the owner installs a hook that takes fully framed bytes to the
//! wire, and feeds received bytes in as they turn up, in whatever chunks the
//! transport produces.
//!
//! Outbound, a packet is serialized with its CRC (the `wire` crate), COBS
//! framed (the `cobs` crate) and handed to the transmit hook. Inbound, bytes
//! run through the packetiser, each complete frame is COBS-decoded, CRC
//! checked, parsed and routed: broadcasts and publishes to the topic's
//! subscribers (publishes are ACKed first), ACKs to whichever publisher is
//! waiting on them.
//!
//! Two profiles cover the two kinds of target. [`Node`] is for hosts with
//! threads: every method is safe to call from anywhere and an acknowledged
//! publish blocks its caller. [`PollingNode`] is for single-threaded
//! cooperative targets: nothing blocks and the owner pumps the state machine
//! instead.

mod ack;
#[cfg(feature = "threaded")]
mod node;
mod polling;
#[cfg(feature = "threaded")]
mod port;
mod registry;


pub use ack::MAX_PENDING_ACKS;
pub use cobs::CobsError;
#[cfg(feature = "threaded")]
pub use node::Node;
pub use polling::PollingNode;
pub use registry::MAX_SUBSCRIBERS;
pub use wire::{Packet, PacketType, Topic, WireError, MAX_PACKET_SIZE, MAX_TOPIC_LENGTH};

/// Errors from use of this crate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// Error from the framing layer
    #[error("framing error: {0}")]
    Framing(#[from] CobsError),
    /// Error from the packet layer
    #[error("packet error: {0}")]
    Wire(#[from] WireError),
    /// An ACK arrived with no pending publish to match it
    #[error("unexpected ACK")]
    UnexpectedAck,
    /// No subscriber carries the given id
    #[error("unrecognised subscriber")]
    UnknownSubscriber,
}

/// Result of an acknowledged publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResponse {
    /// The matching ACK arrived in time
    Success,
    /// Still waiting; only a [`PollingNode`] reports this
    Pending,
    /// No ACK within the allowed time
    Timeout,
}

/// Counters maintained by a node
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NodeStats {
    /// Frames handed to the transmit hook
    pub tx_frames: u64,
    /// Frames received and parsed cleanly
    pub rx_frames: u64,
    /// Frames abandoned to framing, CRC or parse errors
    pub rx_errors: u64,
    /// Subscriber callbacks invoked
    pub dispatched: u64,
}

// Unwrap one raw frame: COBS, then CRC, then parse
pub(crate) fn decode_frame(frame: &[u8]) -> Result<Packet, NodeError> {
    let mut packet = Vec::with_capacity(frame.len());
    cobs::decode(frame, &mut packet)?;
    Ok(Packet::decode(&packet)?)
}
