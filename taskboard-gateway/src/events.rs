//! Fan-out of board events to connected subscribers.
//!
//! Each subscriber owns an unbounded channel, so publishing never blocks on
//! a slow consumer. Delivery is at-least-once to subscribers registered at
//! publish time; late subscribers receive nothing retroactively and are
//! expected to resync via a board fetch. No ordering is guaranteed between
//! events from concurrently executing mutations.

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use taskboard_proto::event::BoardEvent;

/// Opaque handle identifying one subscriber channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of live subscriber channels.
#[derive(Default)]
pub struct EventBroadcaster {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::UnboundedSender<BoardEvent>>>,
}

impl EventBroadcaster {
    /// Creates an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its handle and event stream.
    pub async fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<BoardEvent>) {
        let id = SubscriberId(Uuid::now_v7());
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.insert(id, tx);
        tracing::debug!(subscriber = %id, "subscriber registered");
        (id, rx)
    }

    /// Removes a subscriber; its receiver sees end-of-stream.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.write().await.remove(&id).is_some() {
            tracing::debug!(subscriber = %id, "subscriber removed");
        }
    }

    /// Publishes one event to every currently registered subscriber.
    ///
    /// Subscribers whose receiving side has gone away are pruned.
    pub async fn publish(&self, event: BoardEvent) {
        let mut subscribers = self.subscribers.write().await;
        let mut dead = Vec::new();
        for (id, sender) in subscribers.iter() {
            if sender.send(event.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            subscribers.remove(&id);
            tracing::debug!(subscriber = %id, "pruned dead subscriber");
        }
        tracing::debug!(
            kind = ?event.kind(),
            task_id = event.task_id(),
            subscribers = subscribers.len(),
            "event published"
        );
    }

    /// Number of currently registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
