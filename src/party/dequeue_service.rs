use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::kernel::job_bus::{JobBus, QUEUE_CHECKIN_EXPIRED};
use crate::kernel::pubsub::{PubSubBus, CACHE_KEY_QUEUE_POSITIONS, CHANNEL_DEQUEUE, CHANNEL_QUEUE_POSITIONS};
use crate::kernel::Clock;

use super::errors::PartyError;
use super::store::PartyStore;

/// Admits as many queued parties as current capacity allows, in strict FIFO
/// order, then refreshes the published queue-position snapshot.
///
/// Runs are idempotent: if capacity hasn't changed since the last run, the
/// second run flips no statuses and republishes the same snapshot.
pub struct DequeueService {
    store: Arc<dyn PartyStore>,
    job_bus: Arc<dyn JobBus>,
    pubsub: Arc<dyn PubSubBus>,
    clock: Arc<dyn Clock>,
    max_seats: i64,
    checkin_expiry_seconds: i64,
}

impl DequeueService {
    pub fn new(
        store: Arc<dyn PartyStore>,
        job_bus: Arc<dyn JobBus>,
        pubsub: Arc<dyn PubSubBus>,
        clock: Arc<dyn Clock>,
        max_seats: i64,
        checkin_expiry_seconds: i64,
    ) -> Self {
        Self {
            store,
            job_bus,
            pubsub,
            clock,
            max_seats,
            checkin_expiry_seconds,
        }
    }

    pub async fn run(&self) -> Result<(), PartyError> {
        let now = self.clock.now();
        let available = self.store.available_seats(now, self.max_seats).await?;

        if available > 0 {
            let candidates = self.store.parties_to_dequeue(available).await?;

            if !candidates.is_empty() {
                if let Some(expiration) = self
                    .store
                    .set_checking_in(&candidates, now, self.checkin_expiry_seconds)
                    .await?
                {
                    self.job_bus
                        .enqueue(QUEUE_CHECKIN_EXPIRED, Duration::from_secs(self.checkin_expiry_seconds as u64))
                        .await
                        .map_err(PartyError::Internal)?;

                    self.pubsub
                        .publish(
                            CHANNEL_DEQUEUE,
                            json!({ "partyIDs": candidates, "checkingInExpiration": expiration }),
                        )
                        .await
                        .map_err(PartyError::Internal)?;

                    tracing::debug!(count = candidates.len(), "admitted parties from queue");
                }
            }
        }

        let positions = self.store.current_queue_positions().await?;
        let snapshot = json!({ "queuedParties": positions });

        self.pubsub
            .cache_set(CACHE_KEY_QUEUE_POSITIONS, snapshot.clone())
            .await
            .map_err(PartyError::Internal)?;

        self.pubsub
            .publish(CHANNEL_QUEUE_POSITIONS, snapshot)
            .await
            .map_err(PartyError::Internal)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{FixedClock, InMemoryJobBus, InMemoryPubSubBus};
    use crate::party::models::{Party, PartyStatus};
    use crate::party::store::InMemoryPartyStore;
    use chrono::{DateTime, Utc};
    use futures::StreamExt;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn party(party_id: &str, size: i32, queued_at: DateTime<Utc>) -> Party {
        Party {
            id: uuid::Uuid::new_v4(),
            party_id: party_id.to_string(),
            name: "Test".to_string(),
            size,
            queued_at,
            status: PartyStatus::Queued,
            checkin_expiration: None,
            seat_expiration: None,
        }
    }

    fn service(
        store: Arc<InMemoryPartyStore>,
        job_bus: Arc<InMemoryJobBus>,
        pubsub: Arc<InMemoryPubSubBus>,
    ) -> DequeueService {
        DequeueService::new(store, job_bus, pubsub, Arc::new(FixedClock::new(now())), 10, 60)
    }

    #[tokio::test]
    async fn single_party_that_fits_is_admitted_and_broadcast() {
        let store = Arc::new(InMemoryPartyStore::new());
        store.seed(party("A", 2, now()));
        let job_bus = Arc::new(InMemoryJobBus::new());
        let pubsub = Arc::new(InMemoryPubSubBus::new());

        let mut dequeue_events = pubsub.subscribe(CHANNEL_DEQUEUE).await.unwrap();

        service(store.clone(), job_bus.clone(), pubsub.clone())
            .run()
            .await
            .unwrap();

        let party_after = store.get_by_party_id("A").await.unwrap();
        assert_eq!(party_after.status, PartyStatus::CheckingIn);

        let event = dequeue_events.next().await.unwrap();
        assert_eq!(event["partyIDs"], json!(["A"]));

        assert_eq!(
            job_bus.poll_due(QUEUE_CHECKIN_EXPIRED).await.unwrap(),
            None,
            "checkin-expiry job should be scheduled 60s out, not due yet"
        );
    }

    #[tokio::test]
    async fn party_too_large_for_capacity_blocks_the_whole_prefix() {
        let store = Arc::new(InMemoryPartyStore::new());
        store.seed(party("Big", 9, now()));
        store.seed(party("Small", 1, now() + chrono::Duration::seconds(1)));
        let job_bus = Arc::new(InMemoryJobBus::new());
        let pubsub = Arc::new(InMemoryPubSubBus::new());

        let mut positions = pubsub.subscribe(CHANNEL_QUEUE_POSITIONS).await.unwrap();

        DequeueService::new(store.clone(), job_bus, pubsub, Arc::new(FixedClock::new(now())), 5, 60)
            .run()
            .await
            .unwrap();

        assert_eq!(store.get_by_party_id("Big").await.unwrap().status, PartyStatus::Queued);

        let snapshot = positions.next().await.unwrap();
        assert_eq!(snapshot["queuedParties"][0]["partyID"], json!("Big"));
    }

    #[tokio::test]
    async fn rerunning_an_empty_queue_is_a_no_op() {
        let store = Arc::new(InMemoryPartyStore::new());
        let job_bus = Arc::new(InMemoryJobBus::new());
        let pubsub = Arc::new(InMemoryPubSubBus::new());
        let svc = service(store, job_bus, pubsub);

        svc.run().await.unwrap();
        svc.run().await.unwrap();
    }
}
