//! Common test helpers for integration tests.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{create_test_app_state, send};
//! ```
//!
//! # Note
//!
//! Each integration test file is compiled as a separate crate, so helpers
//! used by only one of them would otherwise raise dead code warnings.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use safe_parallelism::api::{AppState, router};
use safe_parallelism::coordination::{VersionToken, VersionedRecord};
use safe_parallelism::domain::{Issue, IssueFields, IssueId};
use safe_parallelism::infrastructure::{
    AppConfig, ConditionalWrite, StoreError, VersionedStore,
};

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// Configuration with short simulated delays.
pub fn test_config() -> AppConfig {
    AppConfig::builder()
        .processing_delay(Duration::from_millis(200))
        .update_delay(Duration::from_millis(100))
        .build()
        .expect("test configuration is valid")
}

/// Creates a test `AppState` backed by a fresh in-memory store.
pub fn create_test_app_state() -> AppState {
    AppState::in_memory(test_config())
}

/// Creates a test `AppState` whose store always reports an outage.
pub fn create_unavailable_app_state() -> AppState {
    AppState::new(test_config(), Arc::new(UnavailableStore))
}

/// Creates the router over a fresh in-memory state.
pub fn create_test_router() -> Router {
    router(create_test_app_state())
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Response parts collected from a oneshot call.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Sends one request through `application` and decodes the JSON body.
pub async fn send(
    application: Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request is well formed");

    let response = application.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body is readable")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is JSON")
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

// =============================================================================
// Failing Store
// =============================================================================

/// Store standing in for an unreachable database.
pub struct UnavailableStore;

impl UnavailableStore {
    fn outage<T: Send + 'static>() -> BoxFuture<'static, Result<T, StoreError>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".to_string())) })
    }
}

impl VersionedStore for UnavailableStore {
    type Id = IssueId;
    type Payload = IssueFields;

    fn entity(&self) -> &'static str {
        "issue"
    }

    fn read(&self, _id: &IssueId) -> BoxFuture<'static, Result<Option<Issue>, StoreError>> {
        Self::outage()
    }

    fn conditional_write(
        &self,
        _id: &IssueId,
        _payload: IssueFields,
        _expected: VersionToken,
    ) -> BoxFuture<'static, Result<ConditionalWrite<IssueId, IssueFields>, StoreError>> {
        Self::outage()
    }

    fn insert(
        &self,
        _payload: IssueFields,
    ) -> BoxFuture<'static, Result<VersionedRecord<IssueId, IssueFields>, StoreError>> {
        Self::outage()
    }
}
