//! Optimistic concurrency control for versioned records.
//!
//! [`OptimisticConcurrencyGuard`] implements the read / mutate /
//! conditional-write protocol on top of a [`VersionedStore`]. No lock is held
//! while the mutation runs; the store's conditional write decides which of
//! two racing writers wins, and the loser receives
//! [`ConcurrencyError::Conflict`] instead of silently overwriting the winner.
//!
//! # Protocol
//!
//! ```text
//!   read ──none──▶ NotFound
//!    │
//!    ├─ expected version supplied and stale ──▶ Conflict (no write)
//!    │
//!   mutate (async, unlocked)
//!    │
//!   conditional_write(read version)
//!    ├─ Committed ──▶ Ok(record with new version)
//!    ├─ VersionMismatch ──▶ Conflict
//!    └─ Missing ──▶ NotFound
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::error::{ConcurrencyError, ConflictReason};
use super::version::{VersionToken, VersionedRecord};
use crate::infrastructure::{ConditionalWrite, StoreError, VersionedStore};

type DynStore<I, P> = dyn VersionedStore<Id = I, Payload = P>;

// =============================================================================
// Optimistic Concurrency Guard
// =============================================================================

/// Version-checked access to a [`VersionedStore`].
///
/// The guard is stateless apart from the store handle; cloning it is cheap
/// and every clone talks to the same store.
pub struct OptimisticConcurrencyGuard<I, P> {
    store: Arc<DynStore<I, P>>,
}

impl<I, P> Clone for OptimisticConcurrencyGuard<I, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<I, P> fmt::Debug for OptimisticConcurrencyGuard<I, P>
where
    I: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OptimisticConcurrencyGuard")
            .field("entity", &self.store.entity())
            .finish()
    }
}

impl<I, P> OptimisticConcurrencyGuard<I, P>
where
    I: Clone + fmt::Display + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(store: Arc<DynStore<I, P>>) -> Self {
        Self { store }
    }

    /// Reads the current record.
    ///
    /// # Errors
    ///
    /// - [`ConcurrencyError::NotFound`] if no record exists for `id`
    /// - [`ConcurrencyError::StorageUnavailable`] if the store fails
    pub async fn fetch(&self, id: &I) -> Result<VersionedRecord<I, P>, ConcurrencyError> {
        self.store
            .read(id)
            .await
            .map_err(|error| self.map_store_error(error))?
            .ok_or_else(|| self.not_found(id))
    }

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// - [`ConcurrencyError::Conflict`] with [`ConflictReason::UniqueViolation`]
    ///   if a uniqueness constraint rejects the payload
    /// - [`ConcurrencyError::StorageUnavailable`] if the store fails
    pub async fn create(&self, payload: P) -> Result<VersionedRecord<I, P>, ConcurrencyError> {
        let record = self
            .store
            .insert(payload)
            .await
            .map_err(|error| self.map_store_error(error))?;

        tracing::debug!(entity = self.store.entity(), id = %record.id, version = %record.version, "Record created");
        Ok(record)
    }

    /// Applies `mutation` to the current payload and writes the result only
    /// if nobody else wrote in between.
    ///
    /// When `expected_version` is supplied, the caller's view must still be
    /// current at read time or the update is rejected without writing.
    /// Without it, the version read here is the one enforced at commit.
    ///
    /// # Errors
    ///
    /// - [`ConcurrencyError::NotFound`] if the record is absent at read time
    ///   or disappears before the write
    /// - [`ConcurrencyError::Conflict`] if the version is stale or a
    ///   uniqueness constraint rejects the new payload
    /// - [`ConcurrencyError::StorageUnavailable`] if the store fails
    pub async fn update<F, Fut>(
        &self,
        id: &I,
        expected_version: Option<VersionToken>,
        mutation: F,
    ) -> Result<VersionedRecord<I, P>, ConcurrencyError>
    where
        F: FnOnce(P) -> Fut,
        Fut: Future<Output = P>,
    {
        let current = self.fetch(id).await?;

        if let Some(expected) = expected_version
            && expected != current.version
        {
            tracing::warn!(
                entity = self.store.entity(),
                %id,
                %expected,
                current = %current.version,
                "Rejected update from stale version"
            );
            return Err(self.stale(expected, Some(current.version)));
        }

        let read_version = current.version;
        let payload = mutation(current.payload).await;

        let outcome = self
            .store
            .conditional_write(id, payload, read_version)
            .await
            .map_err(|error| self.map_store_error(error))?;

        match outcome {
            ConditionalWrite::Committed(record) => {
                tracing::debug!(
                    entity = self.store.entity(),
                    %id,
                    from = %read_version,
                    to = %record.version,
                    "Record updated"
                );
                Ok(record)
            }
            ConditionalWrite::VersionMismatch { current } => {
                tracing::warn!(
                    entity = self.store.entity(),
                    %id,
                    expected = %read_version,
                    %current,
                    "Concurrent write detected"
                );
                Err(self.stale(read_version, Some(current)))
            }
            ConditionalWrite::Missing => {
                tracing::warn!(entity = self.store.entity(), %id, "Record vanished before write");
                Err(self.not_found(id))
            }
        }
    }

    fn not_found(&self, id: &I) -> ConcurrencyError {
        ConcurrencyError::NotFound {
            entity: self.store.entity(),
            id: id.to_string(),
        }
    }

    fn stale(&self, expected: VersionToken, current: Option<VersionToken>) -> ConcurrencyError {
        ConcurrencyError::Conflict {
            entity: self.store.entity(),
            reason: ConflictReason::StaleVersion { expected, current },
        }
    }

    fn map_store_error(&self, error: StoreError) -> ConcurrencyError {
        match error {
            StoreError::UniqueViolation { field, value, .. } => ConcurrencyError::Conflict {
                entity: self.store.entity(),
                reason: ConflictReason::UniqueViolation { field, value },
            },
            StoreError::Unavailable(message) => {
                tracing::warn!(entity = self.store.entity(), %message, "Store unavailable");
                ConcurrencyError::StorageUnavailable(message)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
