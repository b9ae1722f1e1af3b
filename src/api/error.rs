//! API error handling.
//!
//! Every failure leaves the service as `{"code", "message", "details"?}`
//! with a status derived from the typed coordination error.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::coordination::{ConcurrencyError, IdempotencyError};

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional field-level errors for validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a validation error with field-level details.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            code: "VALIDATION_ERROR".to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Field-level error for validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// Creates a 400 Bad Request response.
    #[must_use]
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new(code, message))
    }

    /// Creates a 400 Bad Request response for validation errors.
    #[must_use]
    pub fn validation_error(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError::validation(message, details),
        )
    }

    /// Creates a 404 Not Found response.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", message))
    }

    /// Creates a 409 Conflict response.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ApiError::new("CONFLICT", message))
    }

    /// Creates a 503 Service Unavailable response.
    #[must_use]
    pub fn storage_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiError::new(
                "STORAGE_UNAVAILABLE",
                "The storage backend is temporarily unavailable. Please retry later.",
            ),
        )
    }

    /// Creates a 500 Internal Server Error response.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("INTERNAL_ERROR", message),
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<IdempotencyError> for ApiErrorResponse {
    fn from(error: IdempotencyError) -> Self {
        match error {
            IdempotencyError::InvalidKey(message) => Self::bad_request("INVALID_KEY", message),
            IdempotencyError::OperationFailed { ref key, .. } => {
                tracing::error!(%key, %error, "Idempotent operation failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new(
                        "OPERATION_FAILED",
                        "The operation failed. It is safe to retry with the same key.",
                    ),
                )
            }
            IdempotencyError::Timeout { ref key, timeout } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                ApiError::new(
                    "TIMEOUT",
                    format!(
                        "The operation for key '{key}' did not complete within {} ms.",
                        timeout.as_millis()
                    ),
                ),
            ),
            IdempotencyError::Abandoned { ref key } => {
                tracing::error!(%key, "Idempotent operation abandoned");
                Self::internal_error("An internal error occurred")
            }
        }
    }
}

impl From<ConcurrencyError> for ApiErrorResponse {
    fn from(error: ConcurrencyError) -> Self {
        match error {
            ConcurrencyError::NotFound { .. } => Self::not_found(error.to_string()),
            ConcurrencyError::Conflict { .. } => Self::conflict(error.to_string()),
            // Outage details stay in the logs.
            ConcurrencyError::StorageUnavailable(ref message) => {
                tracing::error!(%message, "Storage unavailable");
                Self::storage_unavailable()
            }
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Validation error type for request validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Creates a validation error with a single field error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::validation_error("Validation failed", error.errors)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{ConflictReason, VersionToken};
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[rstest]
    #[case::invalid_key(IdempotencyError::InvalidKey("empty".to_string()), StatusCode::BAD_REQUEST, "INVALID_KEY")]
    #[case::failed(
        IdempotencyError::OperationFailed { key: "k".to_string(), source: Arc::new(DiskFull) },
        StatusCode::INTERNAL_SERVER_ERROR,
        "OPERATION_FAILED"
    )]
    #[case::timeout(
        IdempotencyError::Timeout { key: "k".to_string(), timeout: Duration::from_secs(1) },
        StatusCode::GATEWAY_TIMEOUT,
        "TIMEOUT"
    )]
    #[case::abandoned(
        IdempotencyError::Abandoned { key: "k".to_string() },
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR"
    )]
    fn idempotency_error_status(
        #[case] error: IdempotencyError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let response = ApiErrorResponse::from(error);
        assert_eq!(response.status, status);
        assert_eq!(response.error.code, code);
    }

    #[rstest]
    fn operation_failure_hides_source_details() {
        let response = ApiErrorResponse::from(IdempotencyError::OperationFailed {
            key: "k".to_string(),
            source: Arc::new(DiskFull),
        });
        assert!(!response.error.message.contains("disk full"));
    }

    #[rstest]
    fn not_found_keeps_message() {
        let response = ApiErrorResponse::from(ConcurrencyError::NotFound {
            entity: "issue",
            id: "42".to_string(),
        });
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.error.message, "Issue with ID 42 not found.");
    }

    #[rstest]
    fn stale_version_is_conflict() {
        let response = ApiErrorResponse::from(ConcurrencyError::Conflict {
            entity: "issue",
            reason: ConflictReason::StaleVersion {
                expected: VersionToken::from_bytes([1; 8]),
                current: Some(VersionToken::from_bytes([2; 8])),
            },
        });
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.error.code, "CONFLICT");
    }

    #[rstest]
    fn storage_outage_is_service_unavailable() {
        let response = ApiErrorResponse::from(ConcurrencyError::StorageUnavailable(
            "connection refused".to_string(),
        ));
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.error.code, "STORAGE_UNAVAILABLE");
        assert!(!response.error.message.contains("connection refused"));
    }

    #[rstest]
    fn validation_error_carries_details() {
        let response =
            ApiErrorResponse::from(ValidationError::single("title", "Title is required"));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.error.details,
            Some(vec![FieldError::new("title", "Title is required")])
        );
    }
}
