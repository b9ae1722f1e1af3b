//! `POST /idempotency` handler.
//!
//! Requests carrying the same `Idempotency-Key` share one execution: the
//! first one processes the body, concurrent and later ones (within the
//! window) receive the identical result with `X-Cache: HIT`, even when their
//! body differs.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::cache_header::{CacheStatus, build_cache_headers};
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::coordination::IdempotencyKey;
use crate::domain::{ProcessRequest, ProcessedResult, Timestamp};

/// Request header carrying the idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Processes a request at most once per idempotency key.
///
/// # Request
///
/// ```text
/// POST /idempotency
/// Idempotency-Key: abc
///
/// {"value": 10}
/// ```
///
/// # Response
///
/// - **200 OK**: `{"id", "processedValue", "processedAt"}` with `X-Cache`
///   and `X-Cache-Key` headers
/// - **400 Bad Request**: missing or malformed key
/// - **500 / 504**: the shared execution failed or timed out
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] converted from the coordinator's error.
pub async fn process_idempotent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProcessRequest>,
) -> Result<(StatusCode, HeaderMap, Json<ProcessedResult>), ApiErrorResponse> {
    let key = extract_key(&headers)?;

    let delay = state.config.processing_delay;
    let operation_key = key.clone();
    let execution = state
        .idempotency
        .execute_with_key(key, move || async move {
            tokio::time::sleep(delay).await;
            Ok::<_, Infallible>(ProcessedResult::process(
                &operation_key,
                request,
                Timestamp::now(),
            ))
        })
        .await?;

    let status = CacheStatus::from(execution.origin());
    tracing::debug!(key = %execution.key(), origin = %execution.origin(), cache = %status, "Idempotent request served");

    let response_headers = build_cache_headers(status, execution.key());
    let result = Arc::unwrap_or_clone(execution.into_value());
    Ok((StatusCode::OK, response_headers, Json(result)))
}

fn extract_key(headers: &HeaderMap) -> Result<IdempotencyKey, ApiErrorResponse> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Err(ApiErrorResponse::bad_request(
            "INVALID_KEY",
            format!("Header '{IDEMPOTENCY_KEY_HEADER}' is required"),
        ));
    };

    let raw = value.to_str().map_err(|_| {
        ApiErrorResponse::bad_request(
            "INVALID_KEY",
            format!("Header '{IDEMPOTENCY_KEY_HEADER}' must be visible ASCII"),
        )
    })?;

    IdempotencyKey::parse(raw).map_err(ApiErrorResponse::from)
}
