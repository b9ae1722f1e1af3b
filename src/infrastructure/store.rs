//! Storage collaborator contract for versioned records.
//!
//! A [`VersionedStore`] owns write ordering: its conditional write is the
//! single serialization point for optimistic concurrency. Methods return
//! boxed futures so the trait stays object-safe and stores can be shared as
//! `Arc<dyn VersionedStore<...>>`.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::coordination::{VersionToken, VersionedRecord};

// =============================================================================
// Store Error
// =============================================================================

/// Errors raised by a store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated on {entity}.{field}: '{value}'")]
    UniqueViolation {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    /// The store could not be reached or failed for reasons unrelated to
    /// the data (connectivity, I/O).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Conditional Write
// =============================================================================

/// Outcome of [`VersionedStore::conditional_write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalWrite<I, P> {
    /// The version matched; the record now carries a new version.
    Committed(VersionedRecord<I, P>),
    /// The stored version no longer equals the expected one.
    VersionMismatch { current: VersionToken },
    /// No record exists for the id.
    Missing,
}

// =============================================================================
// Versioned Store
// =============================================================================

/// Persistence contract for records guarded by version tokens.
pub trait VersionedStore: Send + Sync {
    /// Identifier type.
    type Id: Clone + Send + Sync + 'static;
    /// Mutable business fields.
    type Payload: Clone + Send + Sync + 'static;

    /// Short lowercase entity name used in messages (e.g. `"issue"`).
    fn entity(&self) -> &'static str;

    /// Reads the current record and its version.
    fn read(
        &self,
        id: &Self::Id,
    ) -> BoxFuture<'static, Result<Option<VersionedRecord<Self::Id, Self::Payload>>, StoreError>>;

    /// Replaces the payload only if the stored version equals `expected`,
    /// assigning a new version on success. The comparison and the write are
    /// atomic.
    fn conditional_write(
        &self,
        id: &Self::Id,
        payload: Self::Payload,
        expected: VersionToken,
    ) -> BoxFuture<'static, Result<ConditionalWrite<Self::Id, Self::Payload>, StoreError>>;

    /// Inserts a new record with a fresh id and initial version.
    fn insert(
        &self,
        payload: Self::Payload,
    ) -> BoxFuture<'static, Result<VersionedRecord<Self::Id, Self::Payload>, StoreError>>;
}
