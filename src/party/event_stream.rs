//! Per-connection subscriber that turns pub/sub channel traffic into SSE
//! frames filtered to one client's party.
//!
//! One bridge instance per open connection: a background task owns the
//! subscriptions and forwards matching messages into an mpsc channel that
//! backs the SSE response. Subscriptions are dropped as soon as they stop
//! being relevant (after admission, after check-in-window expiry, or when
//! the client disconnects).

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::kernel::pubsub::{
    PubSubBus, CACHE_KEY_QUEUE_POSITIONS, CHANNEL_CHECKIN_EXPIRED, CHANNEL_DEQUEUE,
    CHANNEL_QUEUE_POSITIONS,
};
use crate::kernel::sse::json_event;
use crate::party::models::{PartyId, PartyStatus};
use crate::party::store::PartyStore;

pub async fn party_event_stream(
    store: Arc<dyn PartyStore>,
    pubsub: Arc<dyn PubSubBus>,
    party_id: PartyId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Event>(32);

    tokio::spawn(run_bridge(store, pubsub, party_id, tx));

    Sse::new(ReceiverStream::new(rx).map(Ok)).keep_alive(KeepAlive::default())
}

async fn run_bridge(
    store: Arc<dyn PartyStore>,
    pubsub: Arc<dyn PubSubBus>,
    party_id: PartyId,
    tx: mpsc::Sender<Event>,
) {
    let Ok(party) = store.get_by_party_id(&party_id).await else {
        let _ = tx
            .send(json_event(&json!({ "status": "UNQUEUED_CLIENT" })))
            .await;
        return;
    };

    let (mut dequeue_events, mut position_events) = if party.status == PartyStatus::CheckingIn {
        if let Some(expiration) = party.checkin_expiration {
            let _ = tx
                .send(json_event(&json!({
                    "status": "CAN_DEQUEUE",
                    "checkingInExpiration": expiration,
                })))
                .await;
        }
        (None, None)
    } else {
        if let Ok(Some(snapshot)) = pubsub.cache_get(CACHE_KEY_QUEUE_POSITIONS).await {
            if let Some(event) = queue_position_event(&snapshot, &party_id) {
                let _ = tx.send(event).await;
            }
        }
        (
            pubsub.subscribe(CHANNEL_DEQUEUE).await.ok(),
            pubsub.subscribe(CHANNEL_QUEUE_POSITIONS).await.ok(),
        )
    };

    let mut checkin_expired_events = pubsub.subscribe(CHANNEL_CHECKIN_EXPIRED).await.ok();

    loop {
        tokio::select! {
            Some(msg) = next_from(&mut dequeue_events) => {
                if party_ids_contains(&msg, &party_id) {
                    if let Some(expiration) = msg.get("checkingInExpiration").cloned() {
                        let _ = tx.send(json_event(&json!({
                            "status": "CAN_DEQUEUE",
                            "checkingInExpiration": expiration,
                        }))).await;
                    }
                    // Admitted: position updates and further dequeue runs are no
                    // longer relevant to this client.
                    dequeue_events = None;
                    position_events = None;
                }
            }
            Some(msg) = next_from(&mut position_events) => {
                if let Some(event) = queue_position_event(&msg, &party_id) {
                    let _ = tx.send(event).await;
                }
            }
            Some(msg) = next_from(&mut checkin_expired_events) => {
                if party_ids_contains(&msg, &party_id) {
                    let _ = tx.send(json_event(&json!({ "status": "CHECKIN_WINDOW_EXPIRED" }))).await;
                    break;
                }
            }
            _ = tx.closed() => break,
            else => break,
        }
    }
}

/// Polls `stream` if present; yields forever-pending otherwise, so a
/// dropped (unsubscribed) channel never wins a `select!` race.
async fn next_from(stream: &mut Option<BoxStream<'static, Value>>) -> Option<Value> {
    match stream {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

fn party_ids_contains(message: &Value, party_id: &str) -> bool {
    message
        .get("partyIDs")
        .and_then(Value::as_array)
        .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(party_id)))
}

fn queue_position_event(snapshot: &Value, party_id: &str) -> Option<Event> {
    let row = snapshot
        .get("queuedParties")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("partyID").and_then(Value::as_str) == Some(party_id))?
        .get("row")?
        .clone();

    Some(json_event(&json!({ "status": "QUEUE_POSITION_UPDATE", "position": row })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_ids_contains_matches_membership() {
        let message = json!({ "partyIDs": ["A", "B"] });
        assert!(party_ids_contains(&message, "A"));
        assert!(!party_ids_contains(&message, "C"));
    }

    #[test]
    fn queue_position_event_returns_none_when_absent() {
        let snapshot = json!({ "queuedParties": [{ "partyID": "A", "row": 1 }] });
        assert!(queue_position_event(&snapshot, "Z").is_none());
        assert!(queue_position_event(&snapshot, "A").is_some());
    }
}
