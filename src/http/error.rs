use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors returned by HTTP handlers before a subscriber is upgraded
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Subscriber limit reached ({0})")]
    SubscriberLimit(usize),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::SubscriberLimit(_) => (StatusCode::SERVICE_UNAVAILABLE, "SUBSCRIBER_LIMIT"),
        };

        let body = Json(json!({
            "error": code,
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}
