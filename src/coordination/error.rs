//! Error taxonomy for both coordination components.
//!
//! Concurrency outcomes (`Conflict`, duplicate keys, waiters sharing a failed
//! execution) are typed here so callers never have to interpret raw storage
//! errors. Infrastructure failures keep their own variant,
//! [`ConcurrencyError::StorageUnavailable`], so an outage is never mistaken
//! for a lost race.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::version::VersionToken;

/// Shared, clonable handle to an operation's failure.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

// =============================================================================
// Idempotency Errors
// =============================================================================

/// Errors returned by [`IdempotencyCoordinator`](super::IdempotencyCoordinator).
///
/// The type is `Clone` because every waiter of a failed execution receives
/// the same error.
#[derive(Debug, Clone, Error)]
pub enum IdempotencyError {
    /// The key was missing or malformed. Not retryable as-is.
    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),

    /// The operation returned an error. The entry was released and the key
    /// may be retried.
    #[error("Operation for idempotency key '{key}' failed: {source}")]
    OperationFailed {
        key: String,
        #[source]
        source: SharedError,
    },

    /// The operation exceeded its allowed duration. The entry was released.
    #[error("Operation for idempotency key '{key}' timed out after {timeout:?}")]
    Timeout { key: String, timeout: Duration },

    /// The execution ended without producing an outcome (panicked or was
    /// aborted). The entry was released.
    #[error("Operation for idempotency key '{key}' was abandoned before completing")]
    Abandoned { key: String },
}

// =============================================================================
// Optimistic Concurrency Errors
// =============================================================================

/// Why a write was rejected as conflicting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another writer committed first; the caller's version is stale.
    StaleVersion {
        expected: VersionToken,
        current: Option<VersionToken>,
    },
    /// A uniqueness constraint rejected the write.
    UniqueViolation { field: &'static str, value: String },
}

/// Errors returned by [`OptimisticConcurrencyGuard`](super::OptimisticConcurrencyGuard).
#[derive(Debug, Clone, Error)]
pub enum ConcurrencyError {
    /// The target record does not exist.
    #[error("{} with ID {id} not found.", capitalize(.entity))]
    NotFound { entity: &'static str, id: String },

    /// The write lost a race or violated a uniqueness constraint. Re-fetch
    /// current state before retrying.
    #[error("{}", conflict_message(.entity, .reason))]
    Conflict {
        entity: &'static str,
        reason: ConflictReason,
    },

    /// The store could not be reached. Unrelated to concurrency.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ConcurrencyError {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn conflict_message(entity: &str, reason: &ConflictReason) -> String {
    match reason {
        ConflictReason::StaleVersion { .. } => format!(
            "Concurrency conflict - the {entity} was modified by another process. Please refresh and try again."
        ),
        ConflictReason::UniqueViolation { field, value } => {
            format!("An {entity} with {field} '{value}' already exists.")
        }
    }
}
