use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The external, URL-safe identifier clients see and carry in their session
/// cookie. Distinct from the internal primary key so that the key generation
/// strategy (UUID vs. short alphabet) can change independently of either.
pub type PartyId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "party_status")]
#[serde(rename_all = "kebab-case")]
pub enum PartyStatus {
    #[sqlx(rename = "queued")]
    Queued,
    #[sqlx(rename = "checking-in")]
    CheckingIn,
    #[sqlx(rename = "seated")]
    Seated,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Party {
    pub id: Uuid,
    pub party_id: PartyId,
    pub name: String,
    pub size: i32,
    pub queued_at: DateTime<Utc>,
    pub status: PartyStatus,
    pub checkin_expiration: Option<DateTime<Utc>>,
    pub seat_expiration: Option<DateTime<Utc>>,
}

/// A queued party's 1-based row in canonical `(queued_at, party_id)` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePosition {
    #[serde(rename = "partyID")]
    pub party_id: PartyId,
    pub row: i64,
}

/// Generates a fresh external identifier: 10 characters from a URL-safe
/// alphabet, collision risk negligible at any realistic queue size.
pub fn generate_party_id() -> PartyId {
    nanoid::nanoid!(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_expected_length() {
        let id = generate_party_id();
        assert_eq!(id.chars().count(), 10);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_party_id();
        let b = generate_party_id();
        assert_ne!(a, b);
    }

    #[test]
    fn status_serializes_in_kebab_case() {
        let value = serde_json::to_value(PartyStatus::CheckingIn).unwrap();
        assert_eq!(value, serde_json::json!("checking-in"));
    }
}
