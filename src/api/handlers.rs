//! Application state and service-level handlers.

use std::sync::Arc;

use axum::Json;
use serde::{Deserialize, Serialize};

use crate::coordination::{
    Clock, IdempotencyCoordinator, OptimisticConcurrencyGuard, SystemClock,
};
use crate::domain::{IssueFields, IssueId, ProcessedResult};
use crate::infrastructure::{AppConfig, InMemoryIssueStore, VersionedStore};

/// Store handle used by the issue endpoints.
pub type IssueStore = Arc<dyn VersionedStore<Id = IssueId, Payload = IssueFields>>;

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Both coordination components are handles over shared state, so cloning
/// `AppState` per request is cheap and every clone sees the same entries and
/// records.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Single-flight coordinator for `POST /idempotency`.
    pub idempotency: IdempotencyCoordinator<ProcessedResult>,
    /// Version-checked access to issues.
    pub issues: OptimisticConcurrencyGuard<IssueId, IssueFields>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Creates the state over `store`, using the system clock.
    #[must_use]
    pub fn new(config: AppConfig, store: IssueStore) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Creates the state with an explicit clock for the idempotency window.
    #[must_use]
    pub fn with_clock(config: AppConfig, store: IssueStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            idempotency: IdempotencyCoordinator::new(config.idempotency, clock),
            issues: OptimisticConcurrencyGuard::new(store),
            config: Arc::new(config),
        }
    }

    /// Creates the state backed by a fresh [`InMemoryIssueStore`].
    #[must_use]
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(InMemoryIssueStore::new()))
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
///
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
