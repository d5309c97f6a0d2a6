//! Session-bound HTTP handlers: create, check-in, leave, and the SSE
//! endpoint, each guarded by the cookie session in `party::session`.

use std::time::Duration;

use axum::extract::State;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::kernel::job_bus::{JobBus, QUEUE_DEQUEUE};
use crate::server::app::AppState;

use super::errors::PartyError;
use super::event_stream::party_event_stream;
use super::models::PartyStatus;
use super::session::{clear_session, read_session, write_session, PartySession};
use super::store::PartyStore;

#[derive(Debug, Deserialize)]
pub struct CreatePartyRequest {
    pub name: String,
    pub size: i32,
}

#[derive(Debug, Serialize)]
pub struct CreatePartyResponse {
    #[serde(rename = "partyID")]
    pub party_id: String,
    #[serde(rename = "positionInQueue")]
    pub position_in_queue: i64,
}

fn duration_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

pub async fn create_party(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Json(payload): Json<CreatePartyRequest>,
) -> Response {
    let trimmed = payload.name.trim();
    let max_len = state.kernel.config.max_party_name_length;

    if trimmed.is_empty() || trimmed.chars().count() > max_len {
        return PartyError::CouldNotCreate.into_response();
    }
    if payload.size < 1 || payload.size as i64 > state.kernel.config.max_seats {
        return PartyError::CouldNotCreate.into_response();
    }

    let escaped_name = html_escape::encode_text(trimmed).to_string();
    let now = state.kernel.clock.now();

    let (party_id, position) = match state.store.create(escaped_name, payload.size, now).await {
        Ok(created) => created,
        Err(_) => return PartyError::CouldNotCreate.into_response(),
    };

    if let Err(err) = state.kernel.job_bus.enqueue(QUEUE_DEQUEUE, Duration::from_secs(0)).await {
        tracing::error!(error = %err, "failed to enqueue dequeue job after create");
    }

    let session = PartySession {
        party_id: Some(party_id.clone()),
        party_size: Some(payload.size),
        status: Some(PartyStatus::Queued),
        initial_queue_position: Some(position),
        seat_expires_at: None,
    };
    let jar = write_session(jar, &session, state.kernel.config.cookie_max_age_seconds);

    let body = Json(CreatePartyResponse {
        party_id,
        position_in_queue: position,
    });

    (axum::http::StatusCode::CREATED, jar, body).into_response()
}

pub async fn check_in(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let now = state.kernel.clock.now();
    let mut session = read_session(&jar, now);

    let Some(party_id) = session.party_id.clone() else {
        return PartyError::NoSession.into_response();
    };

    match state
        .store
        .set_seated(&party_id, now, state.kernel.config.service_time_seconds)
        .await
    {
        Ok(seat_expiration) => {
            if let Err(err) = state
                .kernel
                .job_bus
                .enqueue(
                    crate::kernel::job_bus::QUEUE_SEAT_EXPIRED,
                    duration_until(seat_expiration, now),
                )
                .await
            {
                tracing::error!(error = %err, "failed to enqueue seat-expiry job");
            }

            session.status = Some(PartyStatus::Seated);
            session.seat_expires_at = Some(seat_expiration);
            let jar = write_session(jar, &session, state.kernel.config.cookie_max_age_seconds);

            (jar, Json(json!({ "message": "checked in" }))).into_response()
        }
        Err(PartyError::NotFound) => {
            // set_seated can't distinguish "party gone entirely" from "party
            // exists but isn't in the checking-in window"; ask the store
            // directly for the more precise of the two check-in failure kinds.
            let kind = match state.store.get_by_party_id(&party_id).await {
                Err(PartyError::NotFound) => PartyError::CouldNotCheckIn,
                _ => PartyError::CouldNotSetSeated,
            };
            (clear_session(jar), kind).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub async fn leave_queue(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let now = state.kernel.clock.now();
    let session = read_session(&jar, now);

    let Some(party_id) = session.party_id.clone() else {
        return PartyError::NoSession.into_response();
    };

    match state.store.delete_by_party_id(&party_id).await {
        Ok(()) => {
            if let Err(err) = state.kernel.job_bus.enqueue(QUEUE_DEQUEUE, Duration::from_secs(0)).await {
                tracing::error!(error = %err, "failed to enqueue dequeue job after leave");
            }
            (clear_session(jar), axum::http::StatusCode::NO_CONTENT).into_response()
        }
        Err(PartyError::NotFound) => (clear_session(jar), PartyError::CouldNotDelete).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn events(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let now = state.kernel.clock.now();
    let session = read_session(&jar, now);

    let Some(party_id) = session.party_id.clone() else {
        return PartyError::NoSession.into_response();
    };

    if state.store.get_by_party_id(&party_id).await.is_err() {
        return PartyError::NotFound.into_response();
    }

    party_event_stream(state.store.clone(), state.kernel.pubsub.clone(), party_id)
        .await
        .into_response()
}

pub async fn index() -> Redirect {
    Redirect::to("/party/new")
}

const JOIN_FORM_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Join the waitlist</title></head>
<body>
  <h1>Join the waitlist</h1>
  <form method="post" action="/party" id="join-form">
    <label>Name <input name="name" maxlength="30" required></label>
    <label>Party size <input name="size" type="number" min="1" required></label>
    <button type="submit">Join</button>
  </form>
</body>
</html>"#;

pub async fn join_form() -> Html<&'static str> {
    Html(JOIN_FORM_HTML)
}

pub async fn status_page(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let now = state.kernel.clock.now();
    let session = read_session(&jar, now);

    let Some(party_id) = session.party_id else {
        return Redirect::to("/party/new").into_response();
    };

    Html(format!(
        r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Your place in line</title></head>
<body>
  <h1>Party {party_id}</h1>
  <p id="status">Connecting...</p>
  <script>
    const source = new EventSource("/party/events");
    source.onmessage = (event) => {{
      document.getElementById("status").textContent = event.data;
    }};
  </script>
</body>
</html>"#
    ))
    .into_response()
}
