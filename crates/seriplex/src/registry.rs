//! Topic subscription registry
//!
//! An ordered list of topics, each with an ordered list of subscribers, so
//! callbacks always fire in subscription order. Ids are handed out
//! monotonically and stay unique for the node's lifetime.

use wire::Topic;

/// Sizing hint for subscriber storage
pub const MAX_SUBSCRIBERS: usize = 8;

pub(crate) struct Subscriber<C> {
    pub id: u32,
    pub callback: C,
}

pub(crate) struct TopicSubscribers<C> {
    pub topic: Topic,
    pub subscribers: Vec<Subscriber<C>>,
}

pub(crate) struct Registry<C> {
    topics: Vec<TopicSubscribers<C>>,
    next_id: u32,
}

impl<C> Registry<C> {
    pub fn new() -> Registry<C> {
        Registry {
            topics: Vec::with_capacity(MAX_SUBSCRIBERS),
            next_id: 0,
        }
    }

    /// Register a callback, creating the topic entry on first use
    pub fn subscribe(&mut self, topic: Topic, callback: C) -> u32 {
        let id = self.next_id;
        self.next_id += 1;

        let subscriber = Subscriber { id, callback };
        match self.topics.iter_mut().find(|entry| entry.topic == topic) {
            Some(entry) => entry.subscribers.push(subscriber),
            None => self.topics.push(TopicSubscribers {
                topic,
                subscribers: vec![subscriber],
            }),
        }
        id
    }

    /// Drop the subscriber carrying `id`; false if nobody does
    ///
    /// The topic entry stays even when its last subscriber goes, so a topic
    /// once subscribed never takes the no-subscribers path.
    pub fn unsubscribe(&mut self, id: u32) -> bool {
        for entry in self.topics.iter_mut() {
            if let Some(at) = entry.subscribers.iter().position(|s| s.id == id) {
                entry.subscribers.remove(at);
                return true;
            }
        }
        false
    }

    pub fn unsubscribe_all(&mut self) {
        self.topics.clear();
    }

    /// The entry for a topic, if that topic was ever subscribed
    pub fn entry_mut(&mut self, topic: &Topic) -> Option<&mut TopicSubscribers<C>> {
        self.topics.iter_mut().find(|entry| &entry.topic == topic)
    }
}

impl<C: Clone> Registry<C> {
    /// A topic's callbacks in subscription order, cloned out so they can be
    /// invoked without holding the registry
    pub fn snapshot(&self, topic: &Topic) -> Option<Vec<C>> {
        self.topics
            .iter()
            .find(|entry| &entry.topic == topic)
            .map(|entry| entry.subscribers.iter().map(|s| s.callback.clone()).collect())
    }
}
