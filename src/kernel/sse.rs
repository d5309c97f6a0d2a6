//! Small SSE helpers shared by every event-stream endpoint.
//!
//! The per-domain filtering and subscription lifecycle lives next to the
//! domain it serves (see `party::event_stream`); this module only knows how
//! to turn a JSON value into a wire-format SSE `Event`.
use axum::response::sse::Event;
use serde::Serialize;

/// Builds an SSE `data:` frame carrying `payload` as its JSON body.
pub fn json_event(payload: &impl Serialize) -> Event {
    Event::default().json_data(payload).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to serialize SSE payload");
        Event::default().data("{}")
    })
}
