//! Topic index and fan-out.
//!
//! Subscriptions are spread over a fixed set of buckets, chosen by the
//! connection's subscriber id, each behind its own lock. All edges of one
//! connection live in a single bucket, so teardown touches one lock, while a
//! publish visits every bucket and takes each read lock in turn.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::proto::Event;
use crate::ws::codec::{self, CodecError};
use crate::ws::connection::Connection;

/// Topic carrying a server's events (membership, categories, presence).
pub fn server_topic(server_id: &str) -> String {
    format!("servers:{}", server_id)
}

/// Topic carrying one channel's message traffic.
pub fn channel_topic(channel_id: &str) -> String {
    format!("channels:{}", channel_id)
}

/// Topic for a direct-message thread.
pub fn dm_topic(thread_id: &str) -> String {
    format!("dm:{}", thread_id)
}

/// Outcome of one publish. Failures are already logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Bucket {
    /// topic -> subscriber_id -> connection
    topics: HashMap<String, HashMap<i64, Arc<Connection>>>,
    /// subscriber_id -> topics, for teardown
    by_subscriber: HashMap<i64, HashSet<String>>,
}

impl Bucket {
    fn remove_edge(&mut self, topic: &str, subscriber_id: i64) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = subscribers.remove(&subscriber_id).is_some();
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }
}

/// Many-to-many relation between topics and live connections.
/// Cheap to clone; clones share the same buckets.
#[derive(Clone)]
pub struct TopicIndex {
    buckets: Arc<[RwLock<Bucket>]>,
}

impl TopicIndex {
    pub fn new(bucket_count: usize) -> Self {
        let buckets: Vec<RwLock<Bucket>> = (0..bucket_count.max(1))
            .map(|_| RwLock::new(Bucket::default()))
            .collect();
        Self {
            buckets: buckets.into(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_for(&self, subscriber_id: i64) -> &RwLock<Bucket> {
        let index = subscriber_id.unsigned_abs() % self.buckets.len() as u64;
        &self.buckets[index as usize]
    }

    /// Register `conn` under `topic`. Returns true if the edge is new.
    ///
    /// A connection that has started closing is refused: teardown clears
    /// edges under the same bucket lock, so no edge can outlive it.
    pub fn subscribe(&self, topic: &str, conn: &Arc<Connection>) -> bool {
        let id = conn.subscriber_id();
        let mut bucket = self.bucket_for(id).write();
        if conn.is_closing() {
            return false;
        }

        let inserted = bucket
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(id, Arc::clone(conn))
            .is_none();
        bucket
            .by_subscriber
            .entry(id)
            .or_default()
            .insert(topic.to_string());

        if inserted {
            tracing::trace!(topic = %topic, user_id = %conn.user_id(), "Subscribed");
        }
        inserted
    }

    /// Remove one edge. Returns true if it existed.
    pub fn unsubscribe(&self, topic: &str, conn: &Connection) -> bool {
        let id = conn.subscriber_id();
        let mut bucket = self.bucket_for(id).write();

        let removed = bucket.remove_edge(topic, id);
        let now_empty = match bucket.by_subscriber.get_mut(&id) {
            Some(topics) => {
                topics.remove(topic);
                topics.is_empty()
            }
            None => false,
        };
        if now_empty {
            bucket.by_subscriber.remove(&id);
        }
        removed
    }

    /// Remove every edge of `conn`. Returns how many were removed.
    pub fn unsubscribe_all(&self, conn: &Connection) -> usize {
        let id = conn.subscriber_id();
        let mut bucket = self.bucket_for(id).write();

        let Some(topics) = bucket.by_subscriber.remove(&id) else {
            return 0;
        };
        let mut removed = 0;
        for topic in &topics {
            if bucket.remove_edge(topic, id) {
                removed += 1;
            }
        }
        removed
    }

    pub fn is_subscribed(&self, topic: &str, conn: &Connection) -> bool {
        let id = conn.subscriber_id();
        self.bucket_for(id)
            .read()
            .topics
            .get(topic)
            .is_some_and(|subscribers| subscribers.contains_key(&id))
    }

    /// Topics `conn` is currently subscribed to.
    pub fn topics_of(&self, conn: &Connection) -> Vec<String> {
        let id = conn.subscriber_id();
        self.bucket_for(id)
            .read()
            .by_subscriber
            .get(&id)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.read().topics.get(topic).map_or(0, HashMap::len))
            .sum()
    }

    /// Deliver `frame` to every connection subscribed to `topic`.
    ///
    /// Sends only queue the frame, so this returns once every subscriber has
    /// been handed the buffer. A failing subscriber is logged and skipped.
    pub fn publish(&self, topic: &str, frame: Bytes) -> PublishReport {
        let mut report = PublishReport::default();

        for bucket in self.buckets.iter() {
            let bucket = bucket.read();
            let Some(subscribers) = bucket.topics.get(topic) else {
                continue;
            };
            for conn in subscribers.values() {
                if conn.is_closing() {
                    continue;
                }
                match conn.send(frame.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            topic = %topic,
                            user_id = %conn.user_id(),
                            subscriber_id = conn.subscriber_id(),
                            error = %e,
                            "Dropped frame for subscriber"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            topic = %topic,
            delivered = report.delivered,
            failed = report.failed,
            "Published"
        );
        report
    }

    /// Encode `event` once and publish it. Encoding failures abort the publish.
    pub fn publish_event(&self, topic: &str, event: Event) -> Result<PublishReport, CodecError> {
        let kind = event.kind();
        let frame = codec::encode_event(event).map_err(|e| {
            tracing::error!(topic = %topic, kind = %kind, error = %e, "Failed to encode event");
            e
        })?;
        Ok(self.publish(topic, frame))
    }
}
