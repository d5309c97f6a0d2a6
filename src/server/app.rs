use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::kernel::ServerKernel;
use crate::party::store::PartyStore;
use crate::party::workers::{CheckinExpiryWorker, DequeueWorker, SeatExpiryWorker, Worker};
use crate::party::{api, CheckinExpiryService, DequeueService, SeatExpiryService};

#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<ServerKernel>,
    pub store: Arc<dyn PartyStore>,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

pub fn build_app(kernel: Arc<ServerKernel>, store: Arc<dyn PartyStore>) -> Router {
    let cookie_key = Key::from(kernel.config.session_key.as_bytes());
    let state = AppState {
        kernel,
        store,
        cookie_key,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(api::index))
        .route("/party/new", get(api::join_form))
        .route("/party", post(api::create_party))
        .route("/party", get(api::status_page))
        .route("/party", delete(api::leave_queue))
        .route("/party/check-in", patch(api::check_in))
        .route("/party/events", get(api::events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Spawns the three admission-control workers as background tasks bound to
/// `shutdown`. Each performs one synchronous catch-up run before entering
/// its poll loop.
pub fn spawn_workers(kernel: Arc<ServerKernel>, store: Arc<dyn PartyStore>, shutdown: CancellationToken) {
    let dequeue_service = Arc::new(DequeueService::new(
        store.clone(),
        kernel.job_bus.clone(),
        kernel.pubsub.clone(),
        kernel.clock.clone(),
        kernel.config.max_seats,
        kernel.config.checkin_expiry_seconds,
    ));
    let checkin_expiry_service = Arc::new(CheckinExpiryService::new(
        store.clone(),
        kernel.job_bus.clone(),
        kernel.pubsub.clone(),
        kernel.clock.clone(),
    ));
    let seat_expiry_service = Arc::new(SeatExpiryService::new(
        store,
        kernel.job_bus.clone(),
        kernel.clock.clone(),
    ));

    let job_bus = kernel.job_bus.clone();
    tokio::spawn(Box::new(DequeueWorker(dequeue_service)).run(job_bus.clone(), shutdown.clone()));

    let job_bus = kernel.job_bus.clone();
    tokio::spawn(Box::new(CheckinExpiryWorker(checkin_expiry_service)).run(job_bus.clone(), shutdown.clone()));

    let job_bus = kernel.job_bus.clone();
    tokio::spawn(Box::new(SeatExpiryWorker(seat_expiry_service)).run(job_bus, shutdown));
}
