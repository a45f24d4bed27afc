//! Channel and pattern subscription fan-out, independent per database.
//!
//! Delivery is non-blocking: each subscriber owns a bounded channel, and a
//! full channel drops the message rather than stalling the publisher
//! (shedding, not blocking).

use crate::glob::glob_match;
use crate::reply::Reply;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

/// Bound on a subscriber's pending-message queue before messages start
/// getting dropped for that subscriber.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

pub type SubscriberId = u64;
pub type SubscriberSender = mpsc::Sender<Reply>;
pub type SubscriberReceiver = mpsc::Receiver<Reply>;

/// A subscriber's drop counter, incremented whenever its queue is full at
/// delivery time.
#[derive(Debug, Default)]
pub struct DropCounter(AtomicU64);

impl DropCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

struct Subscriber {
    sender: SubscriberSender,
    dropped: Arc<DropCounter>,
}

/// Per-database pub/sub state: exact-channel and glob-pattern subscription
/// maps, each backed by a sender the hub uses for delivery.
#[derive(Default)]
struct HubInner {
    channels: HashMap<Bytes, HashSet<SubscriberId>>,
    patterns: HashMap<Bytes, HashSet<SubscriberId>>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    subscriber_channels: HashMap<SubscriberId, HashSet<Bytes>>,
    subscriber_patterns: HashMap<SubscriberId, HashSet<Bytes>>,
    next_id: SubscriberId,
}

pub struct PubSubHub {
    inner: RwLock<HubInner>,
}

impl Default for PubSubHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSubHub {
    pub fn new() -> Self {
        PubSubHub {
            inner: RwLock::new(HubInner::default()),
        }
    }

    /// Register a new subscriber and return its id, receiver, and drop
    /// counter. The caller subscribes it to channels/patterns afterward.
    pub fn new_subscriber(&self) -> (SubscriberId, SubscriberReceiver, Arc<DropCounter>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let dropped = Arc::new(DropCounter::default());
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.insert(
            id,
            Subscriber {
                sender: tx,
                dropped: dropped.clone(),
            },
        );
        (id, rx, dropped)
    }

    pub fn subscribe(&self, id: SubscriberId, channel: Bytes) -> usize {
        let mut inner = self.inner.write();
        inner.channels.entry(channel.clone()).or_default().insert(id);
        inner.subscriber_channels.entry(id).or_default().insert(channel);
        Self::subscription_count(&inner, id)
    }

    pub fn unsubscribe(&self, id: SubscriberId, channel: &Bytes) -> usize {
        let mut inner = self.inner.write();
        if let Some(subs) = inner.channels.get_mut(channel) {
            subs.remove(&id);
            if subs.is_empty() {
                inner.channels.remove(channel);
            }
        }
        if let Some(set) = inner.subscriber_channels.get_mut(&id) {
            set.remove(channel);
        }
        Self::subscription_count(&inner, id)
    }

    pub fn psubscribe(&self, id: SubscriberId, pattern: Bytes) -> usize {
        let mut inner = self.inner.write();
        inner.patterns.entry(pattern.clone()).or_default().insert(id);
        inner.subscriber_patterns.entry(id).or_default().insert(pattern);
        Self::subscription_count(&inner, id)
    }

    pub fn punsubscribe(&self, id: SubscriberId, pattern: &Bytes) -> usize {
        let mut inner = self.inner.write();
        if let Some(subs) = inner.patterns.get_mut(pattern) {
            subs.remove(&id);
            if subs.is_empty() {
                inner.patterns.remove(pattern);
            }
        }
        if let Some(set) = inner.subscriber_patterns.get_mut(&id) {
            set.remove(pattern);
        }
        Self::subscription_count(&inner, id)
    }

    pub fn remove_subscriber(&self, id: SubscriberId) {
        let mut inner = self.inner.write();
        if let Some(chans) = inner.subscriber_channels.remove(&id) {
            for channel in chans {
                if let Some(subs) = inner.channels.get_mut(&channel) {
                    subs.remove(&id);
                    if subs.is_empty() {
                        inner.channels.remove(&channel);
                    }
                }
            }
        }
        if let Some(pats) = inner.subscriber_patterns.remove(&id) {
            for pattern in pats {
                if let Some(subs) = inner.patterns.get_mut(&pattern) {
                    subs.remove(&id);
                    if subs.is_empty() {
                        inner.patterns.remove(&pattern);
                    }
                }
            }
        }
        inner.subscribers.remove(&id);
    }

    /// Deliver `message` on `channel` to every exact-match and pattern
    /// subscriber. Returns the number of successful deliveries.
    pub fn publish(&self, channel: &Bytes, message: &[u8]) -> usize {
        let inner = self.inner.read();
        let mut delivered = 0;

        if let Some(ids) = inner.channels.get(channel) {
            for id in ids {
                if let Some(sub) = inner.subscribers.get(id) {
                    let reply = Reply::Array(Some(vec![
                        Reply::Bulk(Some(Bytes::from_static(b"message"))),
                        Reply::Bulk(Some(channel.clone())),
                        Reply::Bulk(Some(Bytes::copy_from_slice(message))),
                    ]));
                    if Self::try_deliver(sub, reply) {
                        delivered += 1;
                    }
                }
            }
        }

        for (pattern, ids) in &inner.patterns {
            if !glob_match(&String::from_utf8_lossy(pattern), &String::from_utf8_lossy(channel)) {
                continue;
            }
            for id in ids {
                if let Some(sub) = inner.subscribers.get(id) {
                    let reply = Reply::Array(Some(vec![
                        Reply::Bulk(Some(Bytes::from_static(b"pmessage"))),
                        Reply::Bulk(Some(pattern.clone())),
                        Reply::Bulk(Some(channel.clone())),
                        Reply::Bulk(Some(Bytes::copy_from_slice(message))),
                    ]));
                    if Self::try_deliver(sub, reply) {
                        delivered += 1;
                    }
                }
            }
        }

        delivered
    }

    /// Publish the keyspace-event notification for a mutated key. A no-op
    /// unless something has subscribed to the corresponding channel — kept
    /// separate from `publish` since callers pass a key, not a channel.
    pub fn publish_keyspace_event(&self, db_index: usize, key: &Bytes) {
        let channel = Bytes::from(format!("__keyspace@{db_index}__:{}", String::from_utf8_lossy(key)));
        self.publish(&channel, b"set");
    }

    fn try_deliver(sub: &Subscriber, reply: Reply) -> bool {
        match sub.sender.try_send(reply) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                sub.dropped.increment();
                warn!("pub/sub subscriber queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn channels_matching(&self, pattern: Option<&str>) -> Vec<Bytes> {
        let inner = self.inner.read();
        match pattern {
            Some(pat) => inner
                .channels
                .keys()
                .filter(|ch| glob_match(pat, &String::from_utf8_lossy(ch)))
                .cloned()
                .collect(),
            None => inner.channels.keys().cloned().collect(),
        }
    }

    pub fn numsub(&self, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        let inner = self.inner.read();
        channels
            .iter()
            .map(|ch| (ch.clone(), inner.channels.get(ch).map_or(0, |s| s.len())))
            .collect()
    }

    pub fn numpat(&self) -> usize {
        self.inner.read().patterns.len()
    }

    fn subscription_count(inner: &HubInner, id: SubscriberId) -> usize {
        let chans = inner.subscriber_channels.get(&id).map_or(0, |s| s.len());
        let pats = inner.subscriber_patterns.get(&id).map_or(0, |s| s.len());
        chans + pats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_exact_and_pattern_subscribers() {
        let hub = PubSubHub::new();
        let (id, mut rx, _dropped) = hub.new_subscriber();
        hub.subscribe(id, Bytes::from_static(b"news"));

        let (pid, mut prx, _) = hub.new_subscriber();
        hub.psubscribe(pid, Bytes::from_static(b"n*"));

        let delivered = hub.publish(&Bytes::from_static(b"news"), b"hello");
        assert_eq!(delivered, 2);
        assert!(rx.try_recv().is_ok());
        assert!(prx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let hub = PubSubHub::new();
        let (id, _rx, dropped) = hub.new_subscriber();
        hub.subscribe(id, Bytes::from_static(b"chan"));

        for _ in 0..(SUBSCRIBER_QUEUE_CAPACITY + 5) {
            hub.publish(&Bytes::from_static(b"chan"), b"x");
        }
        assert!(dropped.get() > 0);
    }
}
