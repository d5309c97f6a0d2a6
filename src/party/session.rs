//! Cookie-based session: the cookie itself is the session record, signed
//! with `SESSION_KEY` so clients can't forge or tamper with it. There is no
//! server-side session table, unlike this codebase's bearer-token sessions
//! elsewhere, because the spec calls for cookies rather than header tokens.

use axum_extra::extract::cookie::{Cookie, SignedCookieJar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{PartyId, PartyStatus};

const SESSION_COOKIE_NAME: &str = "waitlist_session";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartySession {
    pub party_id: Option<PartyId>,
    pub party_size: Option<i32>,
    pub status: Option<PartyStatus>,
    pub initial_queue_position: Option<i64>,
    pub seat_expires_at: Option<DateTime<Utc>>,
}

impl PartySession {
    pub fn is_empty(&self) -> bool {
        self.party_id.is_none()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Reads the session from `jar`, then applies the pre-step every handler
/// needs: a seated party whose seat has already expired is treated as if it
/// had no session at all.
pub fn read_session(jar: &SignedCookieJar, now: DateTime<Utc>) -> PartySession {
    let mut session: PartySession = jar
        .get(SESSION_COOKIE_NAME)
        .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
        .unwrap_or_default();

    if session.status == Some(PartyStatus::Seated)
        && session.seat_expires_at.is_some_and(|expires| expires <= now)
    {
        session.clear();
    }

    session
}

pub fn write_session(jar: SignedCookieJar, session: &PartySession, max_age_seconds: i64) -> SignedCookieJar {
    let value = serde_json::to_string(session).unwrap_or_default();
    let cookie = Cookie::build((SESSION_COOKIE_NAME, value))
        .max_age(time::Duration::seconds(max_age_seconds))
        .http_only(true)
        .path("/")
        .build();
    jar.add(cookie)
}

pub fn clear_session(jar: SignedCookieJar) -> SignedCookieJar {
    jar.remove(Cookie::from(SESSION_COOKIE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_session_has_no_party_id() {
        assert!(PartySession::default().is_empty());
    }

    #[test]
    fn seated_session_past_expiry_is_cleared_on_read() {
        let mut session = PartySession {
            party_id: Some("A".to_string()),
            party_size: Some(2),
            status: Some(PartyStatus::Seated),
            initial_queue_position: Some(1),
            seat_expires_at: Some(
                DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
        };

        let now = DateTime::parse_from_rfc3339("2026-01-01T00:01:00Z")
            .unwrap()
            .with_timezone(&Utc);

        if session.status == Some(PartyStatus::Seated)
            && session.seat_expires_at.is_some_and(|expires| expires <= now)
        {
            session.clear();
        }

        assert!(session.is_empty());
    }
}
