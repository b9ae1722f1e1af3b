//! API module for HTTP handlers.
//!
//! This module contains route definitions and request/response handlers.

pub mod cache_header;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod issues;

use axum::Router;
use axum::routing::{get, post};

pub use cache_header::{CacheStatus, X_CACHE, X_CACHE_KEY, build_cache_headers};
pub use dto::{CreateIssueRequest, IssueResponse, UpdateIssueRequest};
pub use error::{ApiError, ApiErrorResponse, FieldError, ValidationError};
pub use handlers::{AppState, HealthResponse, IssueStore, health_check};
pub use idempotency::{IDEMPOTENCY_KEY_HEADER, process_idempotent};
pub use issues::{create_issue, get_issue, update_issue};

/// Builds the application router.
///
/// Transport layers (tracing, CORS) are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/idempotency", post(process_idempotent))
        .route("/issues", post(create_issue))
        .route("/issues/{id}", get(get_issue).put(update_issue))
        .with_state(state)
}
