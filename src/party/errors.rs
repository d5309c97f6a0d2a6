use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Opaque error kinds surfaced by the party store and services. Variants map
/// 1:1 to a user-facing HTTP status; no backend detail (SQL errors, Redis
/// errors) ever reaches the response body.
#[derive(Error, Debug)]
pub enum PartyError {
    #[error("party not found")]
    NotFound,

    #[error("party could not be created")]
    CouldNotCreate,

    #[error("party could not be deleted")]
    CouldNotDelete,

    #[error("party could not check in")]
    CouldNotCheckIn,

    #[error("party could not be seated")]
    CouldNotSetSeated,

    #[error("no active session")]
    NoSession,

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PartyError {
    fn status(&self) -> StatusCode {
        match self {
            PartyError::NotFound => StatusCode::NOT_FOUND,
            PartyError::CouldNotCreate => StatusCode::BAD_REQUEST,
            PartyError::CouldNotDelete => StatusCode::BAD_REQUEST,
            PartyError::CouldNotCheckIn => StatusCode::BAD_REQUEST,
            PartyError::CouldNotSetSeated => StatusCode::BAD_REQUEST,
            PartyError::NoSession => StatusCode::UNAUTHORIZED,
            PartyError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PartyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The string clients may see. Deliberately generic for the two variants
    /// that wrap a backend error.
    fn public_message(&self) -> String {
        match self {
            PartyError::StoreUnavailable(_) => "internal error".to_string(),
            PartyError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for PartyError {
    fn into_response(self) -> Response {
        if matches!(self, PartyError::StoreUnavailable(_) | PartyError::Internal(_)) {
            tracing::error!(error = %self, "party operation failed");
        }

        let body = json!({ "message": self.public_message() });
        (self.status(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(PartyError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn backend_errors_never_leak_detail() {
        let err = PartyError::Internal(anyhow::anyhow!("connection reset by peer"));
        assert_eq!(err.public_message(), "internal error");
    }
}
