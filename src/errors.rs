use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::queue::QueueError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("request not found")]
    NotFound,

    #[error("request already resolved")]
    AlreadyResolved,

    #[error("queue error: {0}")]
    Queue(QueueError),
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotFound(_) => AppError::NotFound,
            QueueError::AlreadyResolved(_) => AppError::AlreadyResolved,
            other => AppError::Queue(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
                reason.clone(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "request_not_found",
                "request not found".to_string(),
            ),
            AppError::AlreadyResolved => (
                StatusCode::CONFLICT,
                "conflict_error",
                "already_resolved",
                "request already has a decision".to_string(),
            ),
            AppError::Queue(e) => {
                tracing::error!("Queue error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_errors_map_to_client_statuses() {
        let cases = [
            (QueueError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (QueueError::AlreadyResolved("x".into()), StatusCode::CONFLICT),
            (
                QueueError::Io {
                    path: "/q/x.response.json".into(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
