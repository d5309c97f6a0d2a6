//! Broadcast channels plus a tiny key/value cache, used to turn store
//! mutations into fan-out events for connected SSE clients.
//!
//! Mirrors the shape of a NATS-backed publisher split into a real client and
//! an in-memory test double, but backed by Redis `PUBLISH`/`SUBSCRIBE` since
//! that is what this system's configuration surface (`REDIS_HOST`,
//! `REDIS_PORT`) names.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub const CHANNEL_DEQUEUE: &str = "dequeued-channel";
pub const CHANNEL_CHECKIN_EXPIRED: &str = "checking-in-expired-channel";
pub const CHANNEL_QUEUE_POSITIONS: &str = "queue-positions-channel";

pub const CACHE_KEY_QUEUE_POSITIONS: &str = "queued-party-positions";

#[async_trait]
pub trait PubSubBus: Send + Sync {
    async fn publish(&self, channel: &str, message: Value) -> Result<()>;

    /// Subscribe to `channel`; the returned stream yields messages published
    /// after subscription, in publish order. Dropping the stream unsubscribes.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Value>>;

    async fn cache_set(&self, key: &str, value: Value) -> Result<()>;
    async fn cache_get(&self, key: &str) -> Result<Option<Value>>;
}

/// Production implementation. Keeps a multiplexed connection for cache
/// reads/writes, and opens one dedicated pub/sub connection per
/// subscription, since a Redis connection in subscriber mode cannot also
/// issue ordinary commands.
pub struct RedisPubSubBus {
    client: redis::Client,
    cache_conn: ConnectionManager,
}

impl RedisPubSubBus {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let cache_conn = client.get_connection_manager().await?;
        Ok(Self { client, cache_conn })
    }
}

#[async_trait]
impl PubSubBus for RedisPubSubBus {
    async fn publish(&self, channel: &str, message: Value) -> Result<()> {
        let mut conn = self.cache_conn.clone();
        let payload = serde_json::to_string(&message)?;
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Value>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }

    async fn cache_set(&self, key: &str, value: Value) -> Result<()> {
        let mut conn = self.cache_conn.clone();
        let payload = serde_json::to_string(&value)?;
        conn.set::<_, _, ()>(key, payload).await?;
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.cache_conn.clone();
        let payload: Option<String> = conn.get(key).await?;
        Ok(payload.and_then(|p| serde_json::from_str(&p).ok()))
    }
}

/// In-memory test double: one broadcast channel per topic, adapted from the
/// teacher's stream-hub pattern, plus a `RwLock`-guarded cache map.
pub struct InMemoryPubSubBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Value>>>,
    cache: RwLock<HashMap<String, Value>>,
    capacity: usize,
}

impl InMemoryPubSubBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Value> {
        if let Some(sender) = self.channels.read().expect("channels lock poisoned").get(topic) {
            return sender.clone();
        }

        let mut channels = self.channels.write().expect("channels lock poisoned");
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryPubSubBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubBus for InMemoryPubSubBus {
    async fn publish(&self, channel: &str, message: Value) -> Result<()> {
        // No subscribers yet is not an error: the message simply has no audience.
        let _ = self.sender_for(channel).send(message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Value>> {
        let receiver = self.sender_for(channel).subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });
        Ok(Box::pin(stream))
    }

    async fn cache_set(&self, key: &str, value: Value) -> Result<()> {
        self.cache
            .write()
            .expect("cache lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .cache
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .cloned())
    }
}

pub type SharedPubSubBus = Arc<dyn PubSubBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = InMemoryPubSubBus::new();
        let mut stream = bus.subscribe(CHANNEL_DEQUEUE).await.unwrap();

        bus.publish(CHANNEL_DEQUEUE, json!({"partyIDs": ["A"]}))
            .await
            .unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received, json!({"partyIDs": ["A"]}));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let bus = InMemoryPubSubBus::new();
        bus.publish(CHANNEL_CHECKIN_EXPIRED, json!({"partyIDs": []}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cache_roundtrips_a_snapshot() {
        let bus = InMemoryPubSubBus::new();
        assert_eq!(bus.cache_get(CACHE_KEY_QUEUE_POSITIONS).await.unwrap(), None);

        bus.cache_set(CACHE_KEY_QUEUE_POSITIONS, json!({"queuedParties": []}))
            .await
            .unwrap();

        assert_eq!(
            bus.cache_get(CACHE_KEY_QUEUE_POSITIONS).await.unwrap(),
            Some(json!({"queuedParties": []}))
        );
    }
}
