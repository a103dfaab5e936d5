pub mod ingest;
pub mod samples;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::FeedError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Feed(FeedError),
}

impl From<FeedError> for AppError {
    fn from(e: FeedError) -> Self {
        Self::Feed(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Feed(e) => {
                let status = match &e {
                    FeedError::Query { .. } => StatusCode::BAD_GATEWAY,
                    FeedError::Configuration(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind(), e.to_string())
            }
        };

        let body = serde_json::json!({
            "error":  message,
            "kind":   kind,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
