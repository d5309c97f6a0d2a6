// Party - the waitlist admission-control domain.
//
// Lifecycle: queued -> checking-in -> seated, or removed at any point.
// Store operations are the only way any of the three services mutate state;
// the services only decide what to mutate and what to publish.

pub mod api;
pub mod checkin_expiry_service;
pub mod dequeue_service;
pub mod errors;
pub mod event_stream;
pub mod models;
pub mod seat_expiry_service;
pub mod session;
pub mod store;
pub mod workers;

pub use checkin_expiry_service::CheckinExpiryService;
pub use dequeue_service::DequeueService;
pub use errors::PartyError;
pub use models::{Party, PartyId, PartyStatus, QueuePosition};
pub use seat_expiry_service::SeatExpiryService;
pub use store::{InMemoryPartyStore, PartyStore, PgPartyStore};
