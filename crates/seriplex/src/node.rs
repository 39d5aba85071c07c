//! Thread-safe node
//!
//! Every public method serializes on one node-scoped mutex. The two places
//! user code runs get the lock out of the way: subscriber callbacks (and the
//! no-subscribers hook) are invoked from a snapshot with the mutex released,
//! so a callback is free to publish straight back into the node, and
//! `publish_wait` parks on a per-slot condvar that gives the mutex up while
//! it waits. The transmit hook normally runs under the mutex - that is what
//! keeps frames on the wire in serialization order - so it must hand the
//! bytes off rather than call back in; see
//! [`Node::set_thread_safety_enabled`] for the single-threaded loopback
//! arrangement.

use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use log::warn;

use crate::ack::{AckPool, MAX_PENDING_ACKS};
use crate::port::{self, PortCondvar, PortMutex};
use crate::registry::Registry;
use crate::{decode_frame, NodeError, NodeStats, PublishResponse};
use wire::{Packet, PacketType, Topic};

/// Subscriber callback; receives the payload and may rewrite it in place
type Callback = Arc<dyn Fn(&mut Vec<u8>) + Send + Sync>;
/// Takes fully framed bytes to the wire
type TxReady = Arc<dyn Fn(&[u8]) + Send + Sync>;
/// Told about valid inbound packets whose topic nobody subscribes to
type NoSubscribers = Arc<dyn Fn(&Topic, &[u8]) + Send + Sync>;

/// A serial pub/sub endpoint safe to share between threads
///
/// # Example
///
/// A software loopback: the node's transmit hook feeds its own receive path,
/// so a publish comes straight back to the local subscriber.
///
/// ```
/// use std::sync::Arc;
/// use seriplex::{Node, Topic};
///
/// let node = Arc::new(Node::new());
/// node.set_thread_safety_enabled(false);
///
/// let loopback = node.clone();
/// node.set_tx_data_ready(move |frame| {
///     loopback.give_rx_data(frame).unwrap();
/// });
///
/// let topic = Topic::new("greeting").unwrap();
/// node.subscribe(&topic, |data| {
///     assert_eq!(data, b"hello");
/// });
/// node.publish(&topic, b"hello");
/// ```
pub struct Node {
    inner: PortMutex<Inner>,
    ack_condvars: [PortCondvar; MAX_PENDING_ACKS],
}

struct Inner {
    packetiser: cobs::Packetiser,
    registry: Registry<Callback>,
    acks: AckPool,
    next_packet_id: u8,
    thread_safe: bool,
    tx_ready: Option<TxReady>,
    no_subscribers: Option<NoSubscribers>,
    // Serialize/encode scratch, owned per node
    packet: Vec<u8>,
    frame: Vec<u8>,
    stats: NodeStats,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// Create a node with no hooks installed and thread safety on
    pub fn new() -> Node {
        Node {
            inner: PortMutex::new(Inner {
                packetiser: cobs::Packetiser::new(),
                registry: Registry::new(),
                acks: AckPool::new(),
                next_packet_id: 1,
                thread_safe: true,
                tx_ready: None,
                no_subscribers: None,
                packet: Vec::with_capacity(wire::MAX_PACKET_SIZE),
                frame: Vec::with_capacity(cobs::max_encoded_len(wire::MAX_PACKET_SIZE)),
                stats: NodeStats::default(),
            }),
            ack_condvars: std::array::from_fn(|_| PortCondvar::new()),
        }
    }

    /// Install the transmit hook, called with each fully framed packet
    /// (COBS-encoded, zero-terminated) the node wants on the wire
    ///
    /// With thread safety on the hook runs under the node lock and must not
    /// call back into this node. While no hook is installed, publishes are
    /// dropped and the packet id does not advance.
    pub fn set_tx_data_ready(&self, hook: impl Fn(&[u8]) + Send + Sync + 'static) {
        port::lock(&self.inner).tx_ready = Some(Arc::new(hook));
    }

    /// Install the hook fired when a valid inbound packet names a topic with
    /// no subscribers. Always invoked with the node lock released.
    pub fn set_no_subscribers_hook(&self, hook: impl Fn(&Topic, &[u8]) + Send + Sync + 'static) {
        port::lock(&self.inner).no_subscribers = Some(Arc::new(hook));
    }

    /// Declare whether other threads touch this node (on by default)
    ///
    /// Turning it off promises the node is pinned to one thread. The transmit
    /// hook is then invoked with the lock released, which is exactly what a
    /// software loopback needs: the hook can call [`Node::give_rx_data`] on
    /// the same node directly instead of handing the frame to another thread.
    pub fn set_thread_safety_enabled(&self, enabled: bool) {
        port::lock(&self.inner).thread_safe = enabled;
    }

    /// Subscribe a callback to a topic
    ///
    /// Callbacks on one topic fire in subscription order and may mutate the
    /// payload they are handed; the buffer is shared along the chain and dies
    /// when dispatch finishes. Returns the id for [`Node::unsubscribe`].
    pub fn subscribe(
        &self,
        topic: &Topic,
        callback: impl Fn(&mut Vec<u8>) + Send + Sync + 'static,
    ) -> u32 {
        port::lock(&self.inner)
            .registry
            .subscribe(topic.clone(), Arc::new(callback))
    }

    /// Remove one subscriber by id
    ///
    /// # Errors
    /// [`NodeError::UnknownSubscriber`] if no subscriber carries `id`.
    pub fn unsubscribe(&self, id: u32) -> Result<(), NodeError> {
        if port::lock(&self.inner).registry.unsubscribe(id) {
            Ok(())
        } else {
            Err(NodeError::UnknownSubscriber)
        }
    }

    /// Remove every subscriber from every topic
    pub fn unsubscribe_all(&self) {
        port::lock(&self.inner).registry.unsubscribe_all();
    }

    /// Publish fire-and-forget data on a topic; returns the packet id used
    pub fn publish(&self, topic: &Topic, data: &[u8]) -> u8 {
        let inner = port::lock(&self.inner);
        let id = inner.next_packet_id;
        let _inner = self.publish_internal(
            inner,
            Packet::Broadcast {
                id,
                topic: topic.clone(),
                data: data.to_vec(),
            },
        );
        id
    }

    /// Publish on a topic and block until the far end acknowledges or the
    /// timeout passes
    ///
    /// The node lock is released while waiting, so the receive path can
    /// deliver the ACK and other threads carry on publishing. Up to
    /// [`MAX_PENDING_ACKS`] publishes can wait at once; past that the
    /// publish is abandoned and reported as [`PublishResponse::Timeout`].
    pub fn publish_wait(&self, topic: &Topic, data: &[u8], timeout: Duration) -> PublishResponse {
        let mut inner = port::lock(&self.inner);
        let id = inner.next_packet_id;
        let Some(slot) = inner.acks.begin(id) else {
            warn!("pending ACK pool exhausted, publish on {topic} abandoned");
            return PublishResponse::Timeout;
        };

        let inner = self.publish_internal(
            inner,
            Packet::Publish {
                id,
                topic: topic.clone(),
                data: data.to_vec(),
            },
        );

        let mut inner = port::wait_timeout_while(
            &self.ack_condvars[slot],
            inner,
            timeout,
            |state: &mut Inner| !state.acks.acked(slot),
        );

        let got_ack = inner.acks.acked(slot);
        inner.acks.release(slot);
        if got_ack {
            PublishResponse::Success
        } else {
            PublishResponse::Timeout
        }
    }

    /// How many publishers are blocked waiting on an ACK right now
    pub fn num_threads_waiting(&self) -> u32 {
        port::lock(&self.inner).acks.waiting()
    }

    /// Snapshot of the node's counters
    pub fn stats(&self) -> NodeStats {
        port::lock(&self.inner).stats.clone()
    }

    /// Feed received bytes into the node
    ///
    /// Extracts every complete frame from `data` (together with whatever was
    /// left over from earlier calls), decodes each and routes it: a
    /// BROADCAST or PUBLISH runs the topic's subscriber callbacks - a
    /// PUBLISH is ACKed before any callback, so a callback that answers
    /// immediately cannot get its reply onto the wire ahead of the ACK - and
    /// an ACK wakes the matching [`Node::publish_wait`]. Callbacks and the
    /// no-subscribers hook run with the node lock released and may call back
    /// into the node.
    ///
    /// The first error abandons the rest of `data`, so callers must not rely
    /// on partial progress within a chunk. A partial trailing frame is kept
    /// for the next call; the error itself is not fatal to the node.
    ///
    /// # Errors
    /// Any framing, CRC or parse failure for a frame within `data`, or
    /// [`NodeError::UnexpectedAck`] for an ACK matching no pending publish.
    pub fn give_rx_data(&self, data: &[u8]) -> Result<(), NodeError> {
        let mut chunk = data;
        let mut inner = port::lock(&self.inner);

        loop {
            let (frame, rest) = match inner.packetiser.feed(chunk) {
                Ok(progress) => progress,
                Err(error) => {
                    inner.stats.rx_errors += 1;
                    return Err(error.into());
                }
            };
            chunk = rest;
            let Some(frame) = frame else { return Ok(()) };

            let packet = match decode_frame(&frame) {
                Ok(packet) => packet,
                Err(error) => {
                    inner.stats.rx_errors += 1;
                    return Err(error);
                }
            };
            inner.stats.rx_frames += 1;

            match packet {
                Packet::Ack { id } => match inner.acks.complete(id) {
                    Some(slot) => self.ack_condvars[slot].notify_all(),
                    None => return Err(NodeError::UnexpectedAck),
                },
                Packet::Broadcast { topic, data, .. } => {
                    inner = self.dispatch(inner, &topic, data);
                }
                Packet::Publish { id, topic, data } => {
                    /* ACK before any callback runs, so a callback that
                     * publishes in response cannot overtake it */
                    let inner_back = self.publish_internal(inner, Packet::Ack { id });
                    inner = self.dispatch(inner_back, &topic, data);
                }
            }
        }
    }

    // Run a topic's callbacks (or the no-subscribers hook) with the lock
    // released, then take it back
    fn dispatch<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
        topic: &Topic,
        mut data: Vec<u8>,
    ) -> MutexGuard<'a, Inner> {
        match inner.registry.snapshot(topic) {
            Some(callbacks) => {
                inner.stats.dispatched += callbacks.len() as u64;
                drop(inner);
                for callback in &callbacks {
                    callback(&mut data);
                }
                port::lock(&self.inner)
            }
            None => match inner.no_subscribers.clone() {
                Some(hook) => {
                    drop(inner);
                    hook(topic, &data);
                    port::lock(&self.inner)
                }
                None => inner,
            },
        }
    }

    // Serialize, frame and hand one packet to the transmit hook. Does
    // nothing while no hook is installed. Advances the id counter for
    // BROADCAST and PUBLISH, wrapping 255 back round to 1.
    fn publish_internal<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
        packet: Packet,
    ) -> MutexGuard<'a, Inner> {
        let Some(tx_ready) = inner.tx_ready.clone() else {
            return inner;
        };

        let state = &mut *inner;
        let mut pre = std::mem::take(&mut state.packet);
        let mut frame = std::mem::take(&mut state.frame);
        packet.encode(&mut pre);
        cobs::encode(&pre, &mut frame);
        state.packet = pre;

        if packet.packet_type() != PacketType::Ack {
            state.next_packet_id = match state.next_packet_id.wrapping_add(1) {
                0 => 1,
                next => next,
            };
        }
        state.stats.tx_frames += 1;

        if state.thread_safe {
            tx_ready(&frame);
            inner.frame = frame;
            inner
        } else {
            /* Single-thread promise: hand the frame over unlocked so a
             * loopback hook can feed it straight back in */
            drop(inner);
            tx_ready(&frame);
            let mut inner = port::lock(&self.inner);
            inner.frame = frame;
            inner
        }
    }
}
