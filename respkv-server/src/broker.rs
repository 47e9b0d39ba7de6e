//! # Pub/Sub Broker
//!
//! Tracks which connection listens to which channels and patterns and fans
//! published payloads out to their outbound queues. Each subscriber owns an
//! unbounded queue drained by its connection task, so publishing never
//! waits on a slow reader.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::glob::glob_match;
use crate::protocol::push_bulks;

pub type SubscriberId = u64;

#[derive(Debug)]
struct Subscriber {
    outbound: UnboundedSender<Vec<u8>>,
    channels: HashSet<Vec<u8>>,
    patterns: HashSet<Vec<u8>>,
}

impl Subscriber {
    fn subscriptions(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }
}

/// Which set a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Channel,
    Pattern,
}

#[derive(Debug, Default)]
pub struct Broker {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's outbound queue.
    pub fn register(&self, outbound: UnboundedSender<Vec<u8>>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(
            id,
            Subscriber {
                outbound,
                channels: HashSet::new(),
                patterns: HashSet::new(),
            },
        );
        id
    }

    /// Drops every subscription held by `id`.
    pub fn remove(&self, id: SubscriberId) {
        self.subscribers.lock().remove(&id);
    }

    /// Adds `name` to the subscriber's set and returns its subscription count.
    pub fn subscribe(&self, id: SubscriberId, target: Target, name: &[u8]) -> usize {
        let mut subscribers = self.subscribers.lock();
        match subscribers.get_mut(&id) {
            Some(subscriber) => {
                match target {
                    Target::Channel => subscriber.channels.insert(name.to_vec()),
                    Target::Pattern => subscriber.patterns.insert(name.to_vec()),
                };
                subscriber.subscriptions()
            }
            None => 0,
        }
    }

    /// Removes `name` and returns the remaining subscription count.
    pub fn unsubscribe(&self, id: SubscriberId, target: Target, name: &[u8]) -> usize {
        let mut subscribers = self.subscribers.lock();
        match subscribers.get_mut(&id) {
            Some(subscriber) => {
                match target {
                    Target::Channel => subscriber.channels.remove(name),
                    Target::Pattern => subscriber.patterns.remove(name),
                };
                subscriber.subscriptions()
            }
            None => 0,
        }
    }

    /// Names currently in the subscriber's channel or pattern set.
    pub fn names(&self, id: SubscriberId, target: Target) -> Vec<Vec<u8>> {
        let subscribers = self.subscribers.lock();
        subscribers
            .get(&id)
            .map(|subscriber| {
                let set = match target {
                    Target::Channel => &subscriber.channels,
                    Target::Pattern => &subscriber.patterns,
                };
                set.iter().cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn subscriptions(&self, id: SubscriberId) -> usize {
        self.subscribers
            .lock()
            .get(&id)
            .map_or(0, Subscriber::subscriptions)
    }

    /// Queues `payload` for every matching subscription.
    ///
    /// Returns the number of pushes queued. A connection subscribed both to
    /// the channel and to matching patterns receives one push for each.
    pub fn publish(&self, channel: &[u8], payload: &[u8]) -> usize {
        let subscribers = self.subscribers.lock();
        let mut delivered = 0;
        for subscriber in subscribers.values() {
            if subscriber.channels.contains(channel) {
                let mut frame = Vec::new();
                push_bulks(&mut frame, &[&b"message"[..], channel, payload]);
                if subscriber.outbound.send(frame).is_ok() {
                    delivered += 1;
                }
            }
            for pattern in &subscriber.patterns {
                if glob_match(pattern, channel) {
                    let mut frame = Vec::new();
                    push_bulks(&mut frame, &[&b"pmessage"[..], pattern.as_slice(), channel, payload]);
                    if subscriber.outbound.send(frame).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn publish_reaches_channels_and_patterns() {
        let broker = Broker::new();
        let (tx, mut rx) = unbounded_channel();
        let id = broker.register(tx);

        assert_eq!(broker.subscribe(id, Target::Channel, b"news"), 1);
        assert_eq!(broker.subscribe(id, Target::Pattern, b"n*"), 2);
        assert_eq!(broker.publish(b"news", b"hi"), 2);

        assert_eq!(
            rx.try_recv().unwrap(),
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n".to_vec()
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            b"*4\r\n$8\r\npmessage\r\n$2\r\nn*\r\n$4\r\nnews\r\n$2\r\nhi\r\n".to_vec()
        );
        assert_eq!(broker.publish(b"weather", b"rain"), 0);
    }

    #[test]
    fn removed_subscribers_receive_nothing() {
        let broker = Broker::new();
        let (tx, _rx) = unbounded_channel();
        let id = broker.register(tx);
        broker.subscribe(id, Target::Channel, b"a");
        broker.subscribe(id, Target::Channel, b"b");
        assert_eq!(broker.unsubscribe(id, Target::Channel, b"a"), 1);
        assert_eq!(broker.names(id, Target::Channel), vec![b"b".to_vec()]);

        broker.remove(id);
        assert_eq!(broker.subscriptions(id), 0);
        assert_eq!(broker.publish(b"b", b"x"), 0);
    }
}
