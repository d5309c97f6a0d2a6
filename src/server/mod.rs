// HTTP server assembly (Axum) and worker process wiring.
pub mod app;

pub use app::{build_app, spawn_workers, AppState};
