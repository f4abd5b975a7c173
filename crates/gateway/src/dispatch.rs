//! Broadcast dispatcher.
//!
//! Room topics and per-user private queues are `tokio::sync::broadcast`
//! channels created on first use. Publishing never blocks and never persists:
//! an event sent to a topic nobody listens to is dropped.

use parley_chats::{ChatEvent, Topic};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

#[derive(Clone)]
pub struct Dispatcher {
    topics: Arc<RwLock<HashMap<Topic, broadcast::Sender<ChatEvent>>>>,
    users: Arc<RwLock<HashMap<String, broadcast::Sender<ChatEvent>>>>,
    capacity: usize,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            users: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Deliver to the current subscribers of `topic`. Returns how many received it.
    pub async fn publish(&self, topic: &Topic, event: ChatEvent) -> usize {
        let topics = self.topics.read().await;
        let delivered = topics
            .get(topic)
            .and_then(|sender| sender.send(event).ok())
            .unwrap_or(0);
        trace!(%topic, delivered, "published event");
        delivered
    }

    /// Publish on the topic the event belongs to. Private events are ignored.
    pub async fn emit(&self, event: ChatEvent) -> usize {
        match event.topic() {
            Some(topic) => self.publish(&topic, event).await,
            None => 0,
        }
    }

    pub async fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<ChatEvent> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Receiver for the private queue of `user_id`.
    pub async fn user_queue(&self, user_id: &str) -> broadcast::Receiver<ChatEvent> {
        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn send_to_user(&self, user_id: &str, event: ChatEvent) -> bool {
        let users = self.users.read().await;
        match users.get(user_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => {
                debug!(user_id, "no private queue for user");
                false
            }
        }
    }

    /// Drop channels that no receiver listens to anymore.
    pub async fn prune(&self) -> usize {
        let mut removed = 0;
        {
            let mut topics = self.topics.write().await;
            let before = topics.len();
            topics.retain(|_, sender| sender.receiver_count() > 0);
            removed += before - topics.len();
        }
        {
            let mut users = self.users.write().await;
            let before = users.len();
            users.retain(|_, sender| sender.receiver_count() > 0);
            removed += before - users.len();
        }
        removed
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
