//! Cooperative single-threaded node
//!
//! For targets with no threads to block: no locks, nothing suspends. The
//! owner pumps [`PollingNode::give_rx_data`] with whatever the interrupt
//! handler captured and keeps calling [`PollingNode::publish_wait`] until it
//! reports something other than [`PublishResponse::Pending`]. One
//! acknowledged publish can be in flight at a time.

use crate::registry::Registry;
use crate::{decode_frame, NodeError, NodeStats, PublishResponse};
use wire::{Packet, PacketType, Topic};

type Callback = Box<dyn FnMut(&mut Vec<u8>)>;
type TxReady = Box<dyn FnMut(&[u8])>;
type NoSubscribers = Box<dyn FnMut(&Topic, &[u8])>;

// Continuation state for publish_wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Idle,
    Armed { cycles: usize },
}

// The one pending-ACK record; packet id 0 means nothing outstanding
#[derive(Debug, Default, Clone, Copy)]
struct AckEvent {
    packet_id: u8,
    acked: bool,
}

/// A serial pub/sub endpoint for cooperative, lock-free targets
///
/// # Example
///
/// ```
/// use seriplex::{PollingNode, PublishResponse, Topic};
///
/// let mut node = PollingNode::new();
/// node.set_tx_data_ready(|_frame| {
///     // a real port pushes the frame at the UART here
/// });
///
/// let topic = Topic::new("status").unwrap();
/// // First call transmits and arms the correlator...
/// assert_eq!(
///     node.publish_wait(&topic, b"ping", 2),
///     PublishResponse::Pending
/// );
/// // ...and with no ACK fed in, the cycle budget eventually expires
/// assert_eq!(
///     node.publish_wait(&topic, b"ping", 2),
///     PublishResponse::Pending
/// );
/// assert_eq!(
///     node.publish_wait(&topic, b"ping", 2),
///     PublishResponse::Timeout
/// );
/// ```
pub struct PollingNode {
    packetiser: cobs::Packetiser,
    registry: Registry<Callback>,
    next_packet_id: u8,
    tx_ready: Option<TxReady>,
    no_subscribers: Option<NoSubscribers>,
    ack: AckEvent,
    wait: WaitState,
    // Serialize/encode scratch
    packet: Vec<u8>,
    frame: Vec<u8>,
    stats: NodeStats,
}

impl Default for PollingNode {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingNode {
    pub fn new() -> PollingNode {
        PollingNode {
            packetiser: cobs::Packetiser::new(),
            registry: Registry::new(),
            next_packet_id: 1,
            tx_ready: None,
            no_subscribers: None,
            ack: AckEvent::default(),
            wait: WaitState::Idle,
            packet: Vec::with_capacity(wire::MAX_PACKET_SIZE),
            frame: Vec::with_capacity(cobs::max_encoded_len(wire::MAX_PACKET_SIZE)),
            stats: NodeStats::default(),
        }
    }

    /// Install the transmit hook; see [`Node`](crate::Node) for the contract.
    /// While no hook is installed, publishes are dropped and the packet id
    /// does not advance.
    pub fn set_tx_data_ready(&mut self, hook: impl FnMut(&[u8]) + 'static) {
        self.tx_ready = Some(Box::new(hook));
    }

    /// Install the hook fired when a valid inbound packet names a topic with
    /// no subscribers
    pub fn set_no_subscribers_hook(&mut self, hook: impl FnMut(&Topic, &[u8]) + 'static) {
        self.no_subscribers = Some(Box::new(hook));
    }

    /// Subscribe a callback to a topic; returns the id for
    /// [`PollingNode::unsubscribe`]
    pub fn subscribe(&mut self, topic: &Topic, callback: impl FnMut(&mut Vec<u8>) + 'static) -> u32 {
        self.registry.subscribe(topic.clone(), Box::new(callback))
    }

    /// Remove one subscriber by id
    ///
    /// # Errors
    /// [`NodeError::UnknownSubscriber`] if no subscriber carries `id`.
    pub fn unsubscribe(&mut self, id: u32) -> Result<(), NodeError> {
        if self.registry.unsubscribe(id) {
            Ok(())
        } else {
            Err(NodeError::UnknownSubscriber)
        }
    }

    /// Remove every subscriber from every topic
    pub fn unsubscribe_all(&mut self) {
        self.registry.unsubscribe_all();
    }

    /// Publish fire-and-forget data on a topic; returns the packet id used
    pub fn publish(&mut self, topic: &Topic, data: &[u8]) -> u8 {
        let id = self.next_packet_id;
        self.publish_internal(Packet::Broadcast {
            id,
            topic: topic.clone(),
            data: data.to_vec(),
        });
        id
    }

    /// Drive an acknowledged publish without blocking
    ///
    /// The first call transmits and arms the correlator; every later call
    /// burns one cycle of the `timeout_cycles` budget and reports
    /// [`PublishResponse::Pending`] until the ACK lands (then
    /// [`PublishResponse::Success`]) or the budget runs out (then
    /// [`PublishResponse::Timeout`]). Either terminal result resets the
    /// machine, so the next call starts a fresh publish. Pump
    /// [`PollingNode::give_rx_data`] between calls or the ACK can never be
    /// seen.
    pub fn publish_wait(
        &mut self,
        topic: &Topic,
        data: &[u8],
        timeout_cycles: usize,
    ) -> PublishResponse {
        let cycles = match self.wait {
            WaitState::Idle => {
                debug_assert_eq!(self.ack.packet_id, 0);
                let id = self.next_packet_id;
                self.ack = AckEvent {
                    packet_id: id,
                    acked: false,
                };
                self.publish_internal(Packet::Publish {
                    id,
                    topic: topic.clone(),
                    data: data.to_vec(),
                });
                self.wait = WaitState::Armed { cycles: 0 };
                0
            }
            WaitState::Armed { cycles } => cycles,
        };

        let response = if cycles < timeout_cycles {
            self.wait = WaitState::Armed { cycles: cycles + 1 };
            if self.ack.acked {
                PublishResponse::Success
            } else {
                return PublishResponse::Pending;
            }
        } else {
            PublishResponse::Timeout
        };

        /* Terminal either way - reset for the next publish */
        self.ack = AckEvent::default();
        self.wait = WaitState::Idle;
        response
    }

    /// Whether an acknowledged publish is still in flight
    pub fn task_pending(&self) -> bool {
        self.ack.packet_id != 0
    }

    /// The node's counters
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Feed received bytes into the node
    ///
    /// Same contract as [`Node::give_rx_data`](crate::Node::give_rx_data),
    /// except that callbacks hold the node's exclusive borrow and so cannot
    /// call back into it; a cooperative harness queues frames between nodes
    /// instead.
    pub fn give_rx_data(&mut self, data: &[u8]) -> Result<(), NodeError> {
        let mut chunk = data;
        loop {
            let (frame, rest) = match self.packetiser.feed(chunk) {
                Ok(progress) => progress,
                Err(error) => {
                    self.stats.rx_errors += 1;
                    return Err(error.into());
                }
            };
            chunk = rest;
            let Some(frame) = frame else { return Ok(()) };

            let packet = match decode_frame(&frame) {
                Ok(packet) => packet,
                Err(error) => {
                    self.stats.rx_errors += 1;
                    return Err(error);
                }
            };
            self.stats.rx_frames += 1;

            match packet {
                Packet::Ack { id } => {
                    if id != 0 && self.ack.packet_id == id {
                        self.ack.acked = true;
                    } else {
                        return Err(NodeError::UnexpectedAck);
                    }
                }
                Packet::Broadcast { topic, data, .. } => self.dispatch(&topic, data),
                Packet::Publish { id, topic, data } => {
                    /* ACK before any callback-triggered traffic */
                    self.publish_internal(Packet::Ack { id });
                    self.dispatch(&topic, data);
                }
            }
        }
    }

    fn dispatch(&mut self, topic: &Topic, mut data: Vec<u8>) {
        match self.registry.entry_mut(topic) {
            Some(entry) => {
                self.stats.dispatched += entry.subscribers.len() as u64;
                for subscriber in entry.subscribers.iter_mut() {
                    (subscriber.callback)(&mut data);
                }
            }
            None => {
                if let Some(hook) = self.no_subscribers.as_mut() {
                    hook(topic, &data);
                }
            }
        }
    }

    fn publish_internal(&mut self, packet: Packet) {
        if self.tx_ready.is_none() {
            return;
        }

        packet.encode(&mut self.packet);
        cobs::encode(&self.packet, &mut self.frame);

        if packet.packet_type() != PacketType::Ack {
            self.next_packet_id = match self.next_packet_id.wrapping_add(1) {
                0 => 1,
                next => next,
            };
        }
        self.stats.tx_frames += 1;

        if let Some(tx_ready) = self.tx_ready.as_mut() {
            tx_ready(&self.frame);
        }
    }
}
