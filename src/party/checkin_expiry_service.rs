use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::kernel::job_bus::{JobBus, QUEUE_DEQUEUE};
use crate::kernel::pubsub::{PubSubBus, CHANNEL_CHECKIN_EXPIRED};
use crate::kernel::Clock;

use super::errors::PartyError;
use super::store::PartyStore;

/// Purges parties whose check-in window elapsed without confirming, then
/// re-triggers a dequeue run since capacity just freed up.
pub struct CheckinExpiryService {
    store: Arc<dyn PartyStore>,
    job_bus: Arc<dyn JobBus>,
    pubsub: Arc<dyn PubSubBus>,
    clock: Arc<dyn Clock>,
}

impl CheckinExpiryService {
    pub fn new(
        store: Arc<dyn PartyStore>,
        job_bus: Arc<dyn JobBus>,
        pubsub: Arc<dyn PubSubBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            job_bus,
            pubsub,
            clock,
        }
    }

    pub async fn run(&self) -> Result<(), PartyError> {
        let now = self.clock.now();
        let purged = self.store.delete_checkin_expired(now).await?;

        if purged.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = purged.len(), "purged expired check-ins");

        self.pubsub
            .publish(CHANNEL_CHECKIN_EXPIRED, json!({ "partyIDs": purged }))
            .await
            .map_err(PartyError::Internal)?;

        self.job_bus
            .enqueue(QUEUE_DEQUEUE, Duration::from_secs(0))
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

    #[tokio::test]
    async fn expired_checkin_is_purged_and_broadcast() {
        let store = Arc::new(InMemoryPartyStore::new());
        store.seed(Party {
            id: uuid::Uuid::new_v4(),
            party_id: "A".to_string(),
            name: "Test".to_string(),
            size: 2,
            queued_at: now() - chrono::Duration::seconds(120),
            status: PartyStatus::CheckingIn,
            checkin_expiration: Some(now() - chrono::Duration::seconds(1)),
            seat_expiration: None,
        });

        let job_bus = Arc::new(InMemoryJobBus::new());
        let pubsub = Arc::new(InMemoryPubSubBus::new());
        let mut expired_events = pubsub.subscribe(CHANNEL_CHECKIN_EXPIRED).await.unwrap();

        let clock = Arc::new(FixedClock::new(now()));
        CheckinExpiryService::new(store.clone(), job_bus.clone(), pubsub, clock)
            .run()
            .await
            .unwrap();

        assert!(matches!(
            store.get_by_party_id("A").await,
            Err(PartyError::NotFound)
        ));

        let event = expired_events.next().await.unwrap();
        assert_eq!(event["partyIDs"], json!(["A"]));

        assert_eq!(job_bus.poll_due(QUEUE_DEQUEUE).await.unwrap(), Some(()));
    }

    #[tokio::test]
    async fn no_expired_checkins_means_no_broadcast_and_no_job() {
        let store = Arc::new(InMemoryPartyStore::new());
        let job_bus = Arc::new(InMemoryJobBus::new());
        let pubsub = Arc::new(InMemoryPubSubBus::new());
        let clock = Arc::new(FixedClock::new(now()));

        CheckinExpiryService::new(store, job_bus.clone(), pubsub, clock)
            .run()
            .await
            .unwrap();

        assert_eq!(job_bus.poll_due(QUEUE_DEQUEUE).await.unwrap(), None);
    }
}
