use std::sync::Arc;
use std::time::Duration;

use crate::kernel::job_bus::{JobBus, QUEUE_DEQUEUE};
use crate::kernel::Clock;

use super::errors::PartyError;
use super::store::PartyStore;

/// Removes parties whose service time has elapsed and re-triggers a dequeue
/// run. No broadcast is needed here: a seated client's own event stream
/// already closed when they were seated, and the client's session cookie
/// carries the seat expiration it needs.
pub struct SeatExpiryService {
    store: Arc<dyn PartyStore>,
    job_bus: Arc<dyn JobBus>,
    clock: Arc<dyn Clock>,
}

impl SeatExpiryService {
    pub fn new(store: Arc<dyn PartyStore>, job_bus: Arc<dyn JobBus>, clock: Arc<dyn Clock>) -> Self {
        Self { store, job_bus, clock }
    }

    pub async fn run(&self) -> Result<(), PartyError> {
        let now = self.clock.now();
        let removed = self.store.remove_expired_seats(now).await?;

        if removed.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = removed.len(), "released expired seats");

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
    use crate::kernel::{FixedClock, InMemoryJobBus};
    use crate::party::models::{Party, PartyStatus};
    use crate::party::store::InMemoryPartyStore;
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn expired_seat_is_removed_and_triggers_dequeue() {
        let store = Arc::new(InMemoryPartyStore::new());
        store.seed(Party {
            id: uuid::Uuid::new_v4(),
            party_id: "A".to_string(),
            name: "Test".to_string(),
            size: 4,
            queued_at: now() - chrono::Duration::minutes(5),
            status: PartyStatus::Seated,
            checkin_expiration: None,
            seat_expiration: Some(now() - chrono::Duration::seconds(1)),
        });

        let job_bus = Arc::new(InMemoryJobBus::new());
        let clock = Arc::new(FixedClock::new(now()));

        SeatExpiryService::new(store.clone(), job_bus.clone(), clock)
            .run()
            .await
            .unwrap();

        assert!(store.get_by_party_id("A").await.is_err());
        assert_eq!(job_bus.poll_due(QUEUE_DEQUEUE).await.unwrap(), Some(()));
    }

    #[tokio::test]
    async fn seat_not_yet_expired_is_left_alone() {
        let store = Arc::new(InMemoryPartyStore::new());
        store.seed(Party {
            id: uuid::Uuid::new_v4(),
            party_id: "A".to_string(),
            name: "Test".to_string(),
            size: 4,
            queued_at: now() - chrono::Duration::minutes(1),
            status: PartyStatus::Seated,
            checkin_expiration: None,
            seat_expiration: Some(now() + chrono::Duration::minutes(1)),
        });

        let job_bus = Arc::new(InMemoryJobBus::new());
        let clock = Arc::new(FixedClock::new(now()));

        SeatExpiryService::new(store.clone(), job_bus.clone(), clock)
            .run()
            .await
            .unwrap();

        assert!(store.get_by_party_id("A").await.is_ok());
        assert_eq!(job_bus.poll_due(QUEUE_DEQUEUE).await.unwrap(), None);
    }
}
