//! In-process publish/subscribe bus.
//!
//! Stands in for an external broker in single-process deployments and
//! tests. Subjects are dot-separated; a subscription pattern is either an
//! exact subject or a prefix wildcard `"prefix.>"` matching every subject
//! under the prefix. Delivery is broadcast: every subscriber whose pattern
//! matches receives its own copy. No persistence, no delivery guarantees;
//! a subscriber that falls behind loses the oldest deliveries.

pub mod listener;

pub use listener::BusListener;

use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// One message as seen by a subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The concrete subject the message was published to.
    pub subject: String,
    /// Raw message bytes.
    pub payload: Bytes,
    /// Reply subject for request/reply traffic.
    pub reply: Option<String>,
}

/// Request/reply failure.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("no subscribers for subject {subject:?}")]
    NoSubscribers { subject: String },
    #[error("no reply to {subject:?} within {timeout:?}")]
    ReplyTimeout { subject: String, timeout: Duration },
    #[error("reply channel closed before a reply arrived")]
    ReplyChannelClosed,
}

/// Multi-producer, multi-consumer subject bus over tokio broadcast
/// channels, one channel per subscription pattern.
pub struct Bus {
    channels: DashMap<String, broadcast::Sender<Delivery>>,
    capacity: usize,
}

impl Bus {
    /// Bus whose per-pattern channels buffer `capacity` deliveries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Subscribes to `pattern` (exact subject or `"prefix.>"`).
    ///
    /// Subscribers sharing a pattern share a channel; each receives its own
    /// copy of every matching delivery.
    #[must_use]
    pub fn subscribe(&self, pattern: &str) -> broadcast::Receiver<Delivery> {
        self.channels
            .entry(pattern.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publishes `payload` to `subject`. Returns how many subscribers
    /// received it; zero means the message went nowhere.
    pub fn publish(&self, subject: &str, payload: Bytes) -> usize {
        self.publish_with_reply(subject, payload, None)
    }

    /// Publishes with an optional reply subject attached.
    pub fn publish_with_reply(
        &self,
        subject: &str,
        payload: Bytes,
        reply: Option<String>,
    ) -> usize {
        let delivery = Delivery {
            subject: subject.to_string(),
            payload,
            reply,
        };
        let mut receivers = 0;
        for entry in &self.channels {
            if subject_matches(entry.key(), subject) {
                receivers += entry.value().send(delivery.clone()).unwrap_or(0);
            }
        }
        debug!(subject, receivers, "published");
        receivers
    }

    /// Round-trips one request: publishes `payload` to `subject` with an
    /// ephemeral reply subject and awaits the first reply.
    ///
    /// # Errors
    ///
    /// [`BusError::NoSubscribers`] when nothing listens on `subject`;
    /// [`BusError::ReplyTimeout`] when no reply arrives within `timeout`;
    /// [`BusError::ReplyChannelClosed`] if the reply channel is torn down.
    pub async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Delivery, BusError> {
        let reply_subject = format!("_reply.{}", Uuid::new_v4());
        let mut replies = self.subscribe(&reply_subject);

        if self.publish_with_reply(subject, payload, Some(reply_subject)) == 0 {
            return Err(BusError::NoSubscribers {
                subject: subject.to_string(),
            });
        }

        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Ok(delivery)) => Ok(delivery),
            Ok(Err(_)) => Err(BusError::ReplyChannelClosed),
            Err(_) => Err(BusError::ReplyTimeout {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }

    /// Active subscriber count for `pattern`.
    #[must_use]
    pub fn subscriber_count(&self, pattern: &str) -> usize {
        self.channels
            .get(pattern)
            .map_or(0, |entry| entry.value().receiver_count())
    }
}

/// Pattern match: exact subject, or `"prefix.>"` against any subject with
/// at least one token under the prefix.
fn subject_matches(pattern: &str, subject: &str) -> bool {
    match pattern.strip_suffix(".>") {
        Some(prefix) => subject
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.len() > 1 && rest.starts_with('.')),
        None => pattern == subject,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
