use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Errors the HTTP surface can report. Each variant carries exactly the
/// context its JSON envelope needs — nothing here is meant to be `?`-chained
/// through ingest or engine code, which use [`crate::engine::IngestError`]
/// and plain `Result<_, HotelNotFound>` instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("the search index is not ready: {0}")]
    ServiceUnavailable(String),
    #[error("invalid request: {message}")]
    Validation { message: String, fields: Vec<String> },
    #[error("hotel {0} not found")]
    HotelNotFound(u32),
    #[error("query did not complete within the configured deadline")]
    Timeout,
    #[error("over capacity: {0}")]
    OverCapacity(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    error: ErrorBody,
    timestamp: String,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::HotelNotFound(_) => "HOTEL_NOT_FOUND",
            AppError::Timeout => "TIMEOUT_ERROR",
            AppError::OverCapacity(_) => "OVER_CAPACITY",
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::HotelNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::OverCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured detail payload for the error envelope's `details` field —
    /// the offending field list for validation errors, the surrendered-cache
    /// reason for over-capacity, `None` everywhere else.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation { fields, .. } => Some(json!({ "fields": fields })),
            AppError::OverCapacity(reason) => Some(json!({ "reason": reason })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorEnvelope {
            error: ErrorBody { code: self.code(), message: self.to_string(), details: self.details() },
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: uuid::Uuid::new_v4().to_string(),
        };
        (status, Json(json!(body))).into_response()
    }
}
