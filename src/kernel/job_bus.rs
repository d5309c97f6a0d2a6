//! A named, delayed job queue used purely for serialization and scheduling.
//!
//! Payloads are never carried: every queue has exactly one service bound to
//! it, and that service re-queries the party store rather than trusting a
//! stale payload. Enqueuing is "wake this queue's worker no earlier than
//! `delay` from now"; `poll_due` claims and removes the single oldest job
//! that is due, if any.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub const QUEUE_DEQUEUE: &str = "dequeue";
pub const QUEUE_CHECKIN_EXPIRED: &str = "checkin-expired";
pub const QUEUE_SEAT_EXPIRED: &str = "seat-expired";

#[async_trait]
pub trait JobBus: Send + Sync {
    /// Schedule one wake-up of `queue`'s worker, no earlier than `now + delay`.
    async fn enqueue(&self, queue: &str, delay: Duration) -> Result<()>;

    /// Claim and remove the oldest due job on `queue`, if one exists.
    ///
    /// Returns `Ok(Some(()))` when a job was claimed (the worker should run
    /// its bound service), `Ok(None)` when nothing is due yet.
    async fn poll_due(&self, queue: &str) -> Result<Option<()>>;
}

/// Production implementation backed by one Redis sorted set per queue.
///
/// The set's score is the job's due-at time in Unix milliseconds; the
/// member is a fresh UUID, since sorted set members must be unique and the
/// payload carries no information workers need. Because the admission-
/// control design assumes a single worker process per queue (see the
/// concurrency model), claim-then-remove needs no `SKIP LOCKED`-style
/// contention handling.
pub struct RedisJobBus {
    conn: ConnectionManager,
}

impl RedisJobBus {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn key_for(queue: &str) -> String {
        format!("jobs:{queue}")
    }
}

#[async_trait]
impl JobBus for RedisJobBus {
    async fn enqueue(&self, queue: &str, delay: Duration) -> Result<()> {
        let due_at_ms = (Utc::now() + chrono::Duration::from_std(delay)?).timestamp_millis();
        let member = uuid::Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(Self::key_for(queue), member, due_at_ms)
            .await?;
        Ok(())
    }

    async fn poll_due(&self, queue: &str) -> Result<Option<()>> {
        let now_ms = Utc::now().timestamp_millis();
        let key = Self::key_for(queue);
        let mut conn = self.conn.clone();

        let due: Vec<String> = conn.zrangebyscore_limit(&key, 0, now_ms, 0, 1).await?;
        let Some(member) = due.into_iter().next() else {
            return Ok(None);
        };

        let removed: i64 = conn.zrem(&key, member).await?;
        Ok((removed > 0).then_some(()))
    }
}

#[derive(Eq, PartialEq)]
struct DueJob {
    due_at_ms: i64,
    seq: u64,
}

impl Ord for DueJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at_ms
            .cmp(&other.due_at_ms)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for DueJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// In-memory test double: one min-heap of due times per queue.
#[derive(Default)]
pub struct InMemoryJobBus {
    queues: Mutex<HashMap<String, BinaryHeap<Reverse<DueJob>>>>,
    seq: AtomicU64,
}

impl InMemoryJobBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobBus for InMemoryJobBus {
    async fn enqueue(&self, queue: &str, delay: Duration) -> Result<()> {
        let due_at_ms = (Utc::now() + chrono::Duration::from_std(delay)?).timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut queues = self.queues.lock().await;
        queues
            .entry(queue.to_string())
            .or_default()
            .push(Reverse(DueJob { due_at_ms, seq }));
        Ok(())
    }

    async fn poll_due(&self, queue: &str) -> Result<Option<()>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut queues = self.queues.lock().await;
        let Some(heap) = queues.get_mut(queue) else {
            return Ok(None);
        };

        match heap.peek() {
            Some(Reverse(job)) if job.due_at_ms <= now_ms => {
                heap.pop();
                Ok(Some(()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn immediate_job_is_due_right_away() {
        let bus = InMemoryJobBus::new();
        bus.enqueue(QUEUE_DEQUEUE, Duration::from_secs(0))
            .await
            .unwrap();

        assert_eq!(bus.poll_due(QUEUE_DEQUEUE).await.unwrap(), Some(()));
        assert_eq!(bus.poll_due(QUEUE_DEQUEUE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delayed_job_is_not_due_yet() {
        let bus = InMemoryJobBus::new();
        bus.enqueue(QUEUE_CHECKIN_EXPIRED, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(bus.poll_due(QUEUE_CHECKIN_EXPIRED).await.unwrap(), None);
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let bus = InMemoryJobBus::new();
        bus.enqueue(QUEUE_DEQUEUE, Duration::from_secs(0))
            .await
            .unwrap();

        assert_eq!(bus.poll_due(QUEUE_SEAT_EXPIRED).await.unwrap(), None);
        assert_eq!(bus.poll_due(QUEUE_DEQUEUE).await.unwrap(), Some(()));
    }
}
