//! Topic packet encode/decode
//!
//! The pre-framing wire unit. A packet is a type byte, a packet id, an
//! optional topic-and-payload body and a trailing CRC; COBS framing happens
//! a layer below and is none of this crate's business. The encoder and
//! decoder work atomically on complete packets, so there is no concept of
//! state.
//!
//! Broadcast/Publish packet structure:
//! `[ type, id, topic len, topic bytes..., payload..., CRC MSB, CRC LSB ]`
//!
//! Acknowledge packet structure:
//! `[ type, id, CRC MSB, CRC LSB ]`
//!

use crc::{Crc, CRC_16_IBM_3740};
use std::fmt;

#[cfg(test)]
mod test_lib;

/// Maximum serialized packet size, CRC included
pub const MAX_PACKET_SIZE: usize = 1024;

/// Maximum length of a locally built topic; the length byte could describe
/// more, but short keys keep the per-packet overhead honest
pub const MAX_TOPIC_LENGTH: usize = 16;

const CRC_LEN: usize = 2;
// Type byte, id byte and at least part of a CRC
const MIN_PACKET_LEN: usize = 3;

// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Errors from use of this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Computed CRC does not match the transmitted one
    CrcMismatch,
    /// Too few bytes to hold a type, an id and a CRC
    ShortData,
    /// First byte is not a known packet type
    UnrecognisedType(u8),
    /// Declared topic length runs past the end of the packet body
    TopicOverlong,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WireError::CrcMismatch => write!(f, "CRC check failed"),
            WireError::ShortData => write!(f, "Not enough bytes for a packet"),
            WireError::UnrecognisedType(t) => write!(f, "Unrecognised packet type 0x{:02X}", t),
            WireError::TopicOverlong => write!(f, "Topic is longer than the packet allows"),
        }
    }
}

impl std::error::Error for WireError {}

/// On-wire packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// 'B' - fire and forget, no response expected
    Broadcast = 0x42,
    /// 'P' - expects an ACK carrying the same packet id
    Publish = 0x50,
    /// 'A' - acknowledges a PUBLISH
    Ack = 0x41,
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<PacketType, WireError> {
        match value {
            0x42 => Ok(PacketType::Broadcast),
            0x50 => Ok(PacketType::Publish),
            0x41 => Ok(PacketType::Ack),
            other => Err(WireError::UnrecognisedType(other)),
        }
    }
}

/// A bounded byte-string key used to route packets to subscribers
///
/// Topics are bytes, not text; `Display` renders them lossily for humans.
/// Locally built topics are capped at [`MAX_TOPIC_LENGTH`]. Topics arriving
/// off the wire are taken as they come - an over-long one can only ever
/// match no subscribers, so nothing is gained by rejecting the packet.
///
/// # Example
/// ```
/// use wire::Topic;
/// let topic = Topic::new("status").unwrap();
/// assert_eq!(topic.as_bytes(), b"status");
/// assert!(Topic::new("far-too-long-a-topic-name").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Topic(Vec<u8>);

impl Topic {
    /// Create a topic, enforcing the outbound length bound
    ///
    /// # Errors
    /// [`WireError::TopicOverlong`] past [`MAX_TOPIC_LENGTH`] bytes.
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Topic, WireError> {
        let bytes = bytes.as_ref();
        if bytes.len() > MAX_TOPIC_LENGTH {
            return Err(WireError::TopicOverlong);
        }
        Ok(Topic(bytes.to_vec()))
    }

    // Inbound topics skip the outbound bound, see the type docs
    fn from_wire(bytes: &[u8]) -> Topic {
        Topic(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<&str> for Topic {
    type Error = WireError;

    fn try_from(value: &str) -> Result<Topic, WireError> {
        Topic::new(value)
    }
}

/// CRC-16/CCITT-FALSE over a byte range
///
/// # Example
/// ```
/// assert_eq!(wire::crc16(b"123456789"), 0x29B1);
/// assert_eq!(wire::crc16(&[]), 0xFFFF);
/// ```
pub fn crc16(buf: &[u8]) -> u16 {
    CRC16.checksum(buf)
}

/// Append the CRC of `packet` to it, MSB first
pub fn add_crc(packet: &mut Vec<u8>) {
    let crc = crc16(packet);
    packet.push((crc >> 8) as u8);
    packet.push(crc as u8);
}

/// Check the trailing CRC of a packet
///
/// Recomputes over everything but the last two bytes and compares against
/// them.
///
/// # Errors
/// [`WireError::ShortData`] for a packet too short to even carry a CRC, and
/// [`WireError::CrcMismatch`] when the sums disagree.
pub fn verify_crc(packet: &[u8]) -> Result<(), WireError> {
    if packet.len() < MIN_PACKET_LEN {
        return Err(WireError::ShortData);
    }
    let (body, sent) = packet.split_at(packet.len() - CRC_LEN);
    if crc16(body) != u16::from_be_bytes([sent[0], sent[1]]) {
        return Err(WireError::CrcMismatch);
    }
    Ok(())
}

/// Split a packet body into its topic and payload
///
/// `start` is the offset of the topic length byte; [`Packet::decode`] passes
/// 2. The topic spans the following `L` bytes and the payload runs from
/// there to the start of the CRC. The CRC itself is not checked here.
///
/// # Errors
/// [`WireError::TopicOverlong`] when the declared topic length would overlap
/// the CRC, [`WireError::ShortData`] when `start` is outside the packet.
///
/// # Example
/// ```
/// let packet = [0x42, 0x01, 0x02, b'h', b'i', b'!', 0xAB, 0xCD];
/// let (topic, data) = wire::split_packet(&packet, 2).unwrap();
/// assert_eq!(topic.as_bytes(), b"hi");
/// assert_eq!(data, b"!");
/// ```
pub fn split_packet(packet: &[u8], start: usize) -> Result<(Topic, Vec<u8>), WireError> {
    let length_of_topic = *packet.get(start).ok_or(WireError::ShortData)? as usize;
    let body_end = packet.len().checked_sub(CRC_LEN).ok_or(WireError::ShortData)?;

    let topic_start = start + 1;
    let topic_end = topic_start + length_of_topic;
    if topic_end > body_end {
        return Err(WireError::TopicOverlong);
    }

    Ok((
        Topic::from_wire(&packet[topic_start..topic_end]),
        packet[topic_end..body_end].to_vec(),
    ))
}

/// One wire packet
///
/// `Broadcast` and `Publish` carry a topic and payload; a `Publish`
/// additionally obliges the far end to answer with an `Ack` bearing the same
/// packet id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Broadcast { id: u8, topic: Topic, data: Vec<u8> },
    Publish { id: u8, topic: Topic, data: Vec<u8> },
    Ack { id: u8 },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Broadcast { .. } => PacketType::Broadcast,
            Packet::Publish { .. } => PacketType::Publish,
            Packet::Ack { .. } => PacketType::Ack,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Packet::Broadcast { id, .. } | Packet::Publish { id, .. } | Packet::Ack { id } => *id,
        }
    }

    /// Serialize into `op` (cleared first), CRC appended, ready for framing
    ///
    /// The result must fit [`MAX_PACKET_SIZE`]; a topic built through
    /// [`Topic::new`] and a payload within `MAX_PACKET_SIZE` minus the five
    /// bytes of header and CRC overhead always does.
    ///
    /// # Example
    /// ```
    /// use wire::{Packet, Topic};
    /// let mut op = Vec::new();
    /// Packet::Ack { id: 7 }.encode(&mut op);
    /// assert_eq!(op.len(), 4);
    /// assert_eq!(Packet::decode(&op).unwrap(), Packet::Ack { id: 7 });
    /// ```
    pub fn encode(&self, op: &mut Vec<u8>) {
        op.clear();
        op.push(self.packet_type() as u8);
        op.push(self.id());
        match self {
            Packet::Broadcast { topic, data, .. } | Packet::Publish { topic, data, .. } => {
                op.push(topic.len() as u8);
                op.extend_from_slice(topic.as_bytes());
                op.extend_from_slice(data);
            }
            Packet::Ack { .. } => (),
        }
        add_crc(op);
        debug_assert!(op.len() <= MAX_PACKET_SIZE);
    }

    /// Parse a packet: CRC first, then type and id, then the body
    ///
    /// # Errors
    /// Everything [`verify_crc`] and [`split_packet`] report, plus
    /// [`WireError::UnrecognisedType`] for an unknown type byte.
    pub fn decode(packet: &[u8]) -> Result<Packet, WireError> {
        verify_crc(packet)?;
        let id = packet[1];
        match PacketType::try_from(packet[0])? {
            PacketType::Ack => Ok(Packet::Ack { id }),
            PacketType::Broadcast => {
                let (topic, data) = split_packet(packet, 2)?;
                Ok(Packet::Broadcast { id, topic, data })
            }
            PacketType::Publish => {
                let (topic, data) = split_packet(packet, 2)?;
                Ok(Packet::Publish { id, topic, data })
            }
        }
    }
}
