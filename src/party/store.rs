use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::RwLock;

use super::errors::PartyError;
use super::models::{generate_party_id, Party, PartyId, PartyStatus, QueuePosition};

/// Transactional persistence for parties, plus the queue-position and
/// capacity queries the dequeue algorithm is built on.
///
/// Every operation that needs "now" takes it as a parameter rather than
/// reading the clock itself, so a single `Clock::now()` reading from the
/// caller is shared across a whole service run.
#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn get_by_party_id(&self, party_id: &str) -> Result<Party, PartyError>;

    async fn create(
        &self,
        name: String,
        size: i32,
        now: DateTime<Utc>,
    ) -> Result<(PartyId, i64), PartyError>;

    async fn delete_by_party_id(&self, party_id: &str) -> Result<(), PartyError>;

    async fn available_seats(&self, now: DateTime<Utc>, max_seats: i64) -> Result<i64, PartyError>;

    async fn current_queue_positions(&self) -> Result<Vec<QueuePosition>, PartyError>;

    async fn parties_to_dequeue(&self, available: i64) -> Result<Vec<PartyId>, PartyError>;

    async fn set_checking_in(
        &self,
        party_ids: &[PartyId],
        now: DateTime<Utc>,
        checkin_expiry_seconds: i64,
    ) -> Result<Option<DateTime<Utc>>, PartyError>;

    async fn delete_checkin_expired(&self, now: DateTime<Utc>) -> Result<Vec<PartyId>, PartyError>;

    async fn set_seated(
        &self,
        party_id: &str,
        now: DateTime<Utc>,
        service_time_seconds: i64,
    ) -> Result<DateTime<Utc>, PartyError>;

    async fn remove_expired_seats(&self, now: DateTime<Utc>) -> Result<Vec<PartyId>, PartyError>;
}

pub struct PgPartyStore {
    pool: PgPool,
}

impl PgPartyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PartyStore for PgPartyStore {
    async fn get_by_party_id(&self, party_id: &str) -> Result<Party, PartyError> {
        sqlx::query_as::<_, Party>("SELECT * FROM parties WHERE party_id = $1")
            .bind(party_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(PartyError::NotFound)
    }

    async fn create(
        &self,
        name: String,
        size: i32,
        now: DateTime<Utc>,
    ) -> Result<(PartyId, i64), PartyError> {
        let party_id = generate_party_id();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO parties (id, party_id, name, size, queued_at, status)
            VALUES ($1, $2, $3, $4, $5, 'queued')
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(&party_id)
        .bind(&name)
        .bind(size)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|_| PartyError::CouldNotCreate)?;

        let position: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM parties
            WHERE status = 'queued' AND (queued_at, party_id) <= ($1, $2)
            "#,
        )
        .bind(now)
        .bind(&party_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((party_id, position))
    }

    async fn delete_by_party_id(&self, party_id: &str) -> Result<(), PartyError> {
        let result = sqlx::query("DELETE FROM parties WHERE party_id = $1")
            .bind(party_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PartyError::NotFound);
        }
        Ok(())
    }

    async fn available_seats(&self, now: DateTime<Utc>, max_seats: i64) -> Result<i64, PartyError> {
        let occupied: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(size), 0) FROM parties
            WHERE (status = 'seated' AND seat_expiration > $1) OR status = 'checking-in'
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(max_seats - occupied)
    }

    async fn current_queue_positions(&self) -> Result<Vec<QueuePosition>, PartyError> {
        let party_ids: Vec<String> = sqlx::query_scalar(
            "SELECT party_id FROM parties WHERE status = 'queued' ORDER BY queued_at ASC, party_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(party_ids
            .into_iter()
            .enumerate()
            .map(|(index, party_id)| QueuePosition {
                party_id,
                row: index as i64 + 1,
            })
            .collect())
    }

    async fn parties_to_dequeue(&self, available: i64) -> Result<Vec<PartyId>, PartyError> {
        if available <= 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, i32)> = sqlx::query_as(
            "SELECT party_id, size FROM parties WHERE status = 'queued' ORDER BY queued_at ASC, party_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(take_fitting_prefix(rows, available))
    }

    async fn set_checking_in(
        &self,
        party_ids: &[PartyId],
        now: DateTime<Utc>,
        checkin_expiry_seconds: i64,
    ) -> Result<Option<DateTime<Utc>>, PartyError> {
        if party_ids.is_empty() {
            return Ok(None);
        }

        let expiration = now + chrono::Duration::seconds(checkin_expiry_seconds);

        let result = sqlx::query(
            r#"
            UPDATE parties
            SET status = 'checking-in', checkin_expiration = $1
            WHERE party_id = ANY($2) AND status = 'queued'
            "#,
        )
        .bind(expiration)
        .bind(party_ids)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(expiration))
    }

    async fn delete_checkin_expired(&self, now: DateTime<Utc>) -> Result<Vec<PartyId>, PartyError> {
        sqlx::query_scalar(
            r#"
            DELETE FROM parties
            WHERE status = 'checking-in' AND checkin_expiration < $1
            RETURNING party_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn set_seated(
        &self,
        party_id: &str,
        now: DateTime<Utc>,
        service_time_seconds: i64,
    ) -> Result<DateTime<Utc>, PartyError> {
        sqlx::query_scalar(
            r#"
            UPDATE parties
            SET status = 'seated', seat_expiration = $1 + (size * $2) * INTERVAL '1 second'
            WHERE party_id = $3 AND status = 'checking-in'
            RETURNING seat_expiration
            "#,
        )
        .bind(now)
        .bind(service_time_seconds)
        .bind(party_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten()
        .ok_or(PartyError::NotFound)
    }

    async fn remove_expired_seats(&self, now: DateTime<Utc>) -> Result<Vec<PartyId>, PartyError> {
        sqlx::query_scalar(
            r#"
            DELETE FROM parties
            WHERE status = 'seated' AND seat_expiration < $1
            RETURNING party_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }
}

/// Greedy FIFO prefix selection: stop at the first party that would push the
/// running total over `available`, never skip ahead to a smaller one later
/// in the queue.
fn take_fitting_prefix(rows: Vec<(String, i32)>, available: i64) -> Vec<PartyId> {
    let mut total = 0i64;
    let mut selected = Vec::new();

    for (party_id, size) in rows {
        let next_total = total + size as i64;
        if next_total > available {
            break;
        }
        total = next_total;
        selected.push(party_id);
    }

    selected
}

/// In-memory test double backing the dequeue/expiry service unit tests.
#[derive(Default)]
pub struct InMemoryPartyStore {
    parties: RwLock<Vec<Party>>,
}

impl InMemoryPartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a queued party directly, bypassing `create`'s position
    /// computation, for scenario setup in tests.
    pub fn seed(&self, party: Party) {
        self.parties.write().expect("lock poisoned").push(party);
    }

    fn ordered_queued(parties: &[Party]) -> Vec<&Party> {
        let mut queued: Vec<&Party> = parties
            .iter()
            .filter(|p| p.status == PartyStatus::Queued)
            .collect();
        queued.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.party_id.cmp(&b.party_id)));
        queued
    }
}

#[async_trait]
impl PartyStore for InMemoryPartyStore {
    async fn get_by_party_id(&self, party_id: &str) -> Result<Party, PartyError> {
        self.parties
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|p| p.party_id == party_id)
            .cloned()
            .ok_or(PartyError::NotFound)
    }

    async fn create(
        &self,
        name: String,
        size: i32,
        now: DateTime<Utc>,
    ) -> Result<(PartyId, i64), PartyError> {
        let party_id = generate_party_id();
        let mut parties = self.parties.write().expect("lock poisoned");
        parties.push(Party {
            id: uuid::Uuid::new_v4(),
            party_id: party_id.clone(),
            name,
            size,
            queued_at: now,
            status: PartyStatus::Queued,
            checkin_expiration: None,
            seat_expiration: None,
        });

        let position = Self::ordered_queued(&parties)
            .iter()
            .position(|p| p.party_id == party_id)
            .expect("just-inserted party must be present") as i64
            + 1;

        Ok((party_id, position))
    }

    async fn delete_by_party_id(&self, party_id: &str) -> Result<(), PartyError> {
        let mut parties = self.parties.write().expect("lock poisoned");
        let len_before = parties.len();
        parties.retain(|p| p.party_id != party_id);

        if parties.len() == len_before {
            return Err(PartyError::NotFound);
        }
        Ok(())
    }

    async fn available_seats(&self, now: DateTime<Utc>, max_seats: i64) -> Result<i64, PartyError> {
        let occupied: i64 = self
            .parties
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|p| {
                (p.status == PartyStatus::Seated && p.seat_expiration.is_some_and(|exp| exp > now))
                    || p.status == PartyStatus::CheckingIn
            })
            .map(|p| p.size as i64)
            .sum();

        Ok(max_seats - occupied)
    }

    async fn current_queue_positions(&self) -> Result<Vec<QueuePosition>, PartyError> {
        let parties = self.parties.read().expect("lock poisoned");
        Ok(Self::ordered_queued(&parties)
            .into_iter()
            .enumerate()
            .map(|(index, p)| QueuePosition {
                party_id: p.party_id.clone(),
                row: index as i64 + 1,
            })
            .collect())
    }

    async fn parties_to_dequeue(&self, available: i64) -> Result<Vec<PartyId>, PartyError> {
        if available <= 0 {
            return Ok(Vec::new());
        }

        let parties = self.parties.read().expect("lock poisoned");
        let rows = Self::ordered_queued(&parties)
            .into_iter()
            .map(|p| (p.party_id.clone(), p.size))
            .collect();

        Ok(take_fitting_prefix(rows, available))
    }

    async fn set_checking_in(
        &self,
        party_ids: &[PartyId],
        now: DateTime<Utc>,
        checkin_expiry_seconds: i64,
    ) -> Result<Option<DateTime<Utc>>, PartyError> {
        if party_ids.is_empty() {
            return Ok(None);
        }

        let expiration = now + chrono::Duration::seconds(checkin_expiry_seconds);
        let mut parties = self.parties.write().expect("lock poisoned");
        let mut matched = false;

        for party in parties.iter_mut() {
            if party_ids.contains(&party.party_id) && party.status == PartyStatus::Queued {
                party.status = PartyStatus::CheckingIn;
                party.checkin_expiration = Some(expiration);
                matched = true;
            }
        }

        Ok(matched.then_some(expiration))
    }

    async fn delete_checkin_expired(&self, now: DateTime<Utc>) -> Result<Vec<PartyId>, PartyError> {
        let mut parties = self.parties.write().expect("lock poisoned");
        let mut removed = Vec::new();

        parties.retain(|p| {
            let expired = p.status == PartyStatus::CheckingIn
                && p.checkin_expiration.is_some_and(|exp| exp < now);
            if expired {
                removed.push(p.party_id.clone());
            }
            !expired
        });

        Ok(removed)
    }

    async fn set_seated(
        &self,
        party_id: &str,
        now: DateTime<Utc>,
        service_time_seconds: i64,
    ) -> Result<DateTime<Utc>, PartyError> {
        let mut parties = self.parties.write().expect("lock poisoned");
        let party = parties
            .iter_mut()
            .find(|p| p.party_id == party_id && p.status == PartyStatus::CheckingIn)
            .ok_or(PartyError::NotFound)?;

        let expiration = now + chrono::Duration::seconds(service_time_seconds * party.size as i64);
        party.status = PartyStatus::Seated;
        party.seat_expiration = Some(expiration);
        Ok(expiration)
    }

    async fn remove_expired_seats(&self, now: DateTime<Utc>) -> Result<Vec<PartyId>, PartyError> {
        let mut parties = self.parties.write().expect("lock poisoned");
        let mut removed = Vec::new();

        parties.retain(|p| {
            let expired =
                p.status == PartyStatus::Seated && p.seat_expiration.is_some_and(|exp| exp < now);
            if expired {
                removed.push(p.party_id.clone());
            }
            !expired
        });

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn create_assigns_increasing_positions() {
        let store = InMemoryPartyStore::new();
        let (_, first) = store.create("Alice".into(), 2, now()).await.unwrap();
        let (_, second) = store
            .create("Bob".into(), 2, now() + chrono::Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn dequeue_stops_at_first_party_that_does_not_fit() {
        let store = InMemoryPartyStore::new();
        store.seed(party("P1", 8, now()));
        store.seed(party("P2", 2, now() + chrono::Duration::seconds(1)));
        store.seed(party("P3", 2, now() + chrono::Duration::seconds(2)));

        let selected = store.parties_to_dequeue(10).await.unwrap();

        assert_eq!(selected, vec!["P1".to_string(), "P2".to_string()]);
    }

    #[tokio::test]
    async fn dequeue_never_skips_ahead_to_a_smaller_party() {
        let store = InMemoryPartyStore::new();
        store.seed(party("Big", 9, now()));
        store.seed(party("Small", 1, now() + chrono::Duration::seconds(1)));

        let selected = store.parties_to_dequeue(5).await.unwrap();

        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn set_seated_rejects_parties_not_checking_in() {
        let store = InMemoryPartyStore::new();
        store.seed(party("P1", 2, now()));

        let result = store.set_seated("P1", now(), 15).await;

        assert!(matches!(result, Err(PartyError::NotFound)));
    }

    fn party(party_id: &str, size: i32, queued_at: DateTime<Utc>) -> Party {
        Party {
            id: uuid::Uuid::new_v4(),
            party_id: party_id.to_string(),
            name: "Test Party".to_string(),
            size,
            queued_at,
            status: PartyStatus::Queued,
            checkin_expiration: None,
            seat_expiration: None,
        }
    }
}
