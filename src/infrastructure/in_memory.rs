//! In-memory issue store.
//!
//! # Features
//!
//! - Thread-safe with `Arc<RwLock<...>>`
//! - Row-stamp versions from a store-wide monotonic counter, so every
//!   committed write carries a version never issued before
//! - Unique index on issue titles
//! - Compare-and-set under the write lock for conditional writes

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::coordination::{VersionToken, VersionedRecord};
use crate::domain::{Issue, IssueFields, IssueId};
use crate::infrastructure::{ConditionalWrite, StoreError, VersionedStore};

const ENTITY: &str = "issue";

// =============================================================================
// Issue Table
// =============================================================================

/// Rows plus the unique title index, always updated together.
#[derive(Debug, Default)]
struct IssueTable {
    rows: HashMap<IssueId, Issue>,
    titles: HashMap<String, IssueId>,
}

impl IssueTable {
    fn title_taken_by_other(&self, title: &str, id: &IssueId) -> bool {
        self.titles.get(title).is_some_and(|owner| owner != id)
    }
}

// =============================================================================
// In-Memory Issue Store
// =============================================================================

/// In-memory implementation of [`VersionedStore`] for issues.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryIssueStore::new();
/// let issue = store.insert(IssueFields::new("T1", "", Timestamp::now())).await?;
/// let outcome = store
///     .conditional_write(&issue.id, issue.payload.clone(), issue.version)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryIssueStore {
    table: Arc<RwLock<IssueTable>>,
    stamp: Arc<AtomicU64>,
}

impl InMemoryIssueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored issues.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn next_version(stamp: &AtomicU64) -> VersionToken {
        let value = stamp.fetch_add(1, Ordering::SeqCst) + 1;
        VersionToken::from_bytes(value.to_be_bytes())
    }
}

#[allow(clippy::significant_drop_tightening)]
impl VersionedStore for InMemoryIssueStore {
    type Id = IssueId;
    type Payload = IssueFields;

    fn entity(&self) -> &'static str {
        ENTITY
    }

    fn read(&self, id: &IssueId) -> BoxFuture<'static, Result<Option<Issue>, StoreError>> {
        let table = Arc::clone(&self.table);
        let id = *id;
        Box::pin(async move {
            let guard = table.read().await;
            Ok(guard.rows.get(&id).cloned())
        })
    }

    fn conditional_write(
        &self,
        id: &IssueId,
        payload: IssueFields,
        expected: VersionToken,
    ) -> BoxFuture<'static, Result<ConditionalWrite<IssueId, IssueFields>, StoreError>> {
        let table = Arc::clone(&self.table);
        let stamp = Arc::clone(&self.stamp);
        let id = *id;
        Box::pin(async move {
            let mut guard = table.write().await;

            let (current_version, previous_title) = match guard.rows.get(&id) {
                Some(current) => (current.version, current.payload.title.clone()),
                None => return Ok(ConditionalWrite::Missing),
            };

            if current_version != expected {
                return Ok(ConditionalWrite::VersionMismatch {
                    current: current_version,
                });
            }

            if guard.title_taken_by_other(&payload.title, &id) {
                return Err(StoreError::UniqueViolation {
                    entity: ENTITY,
                    field: "title",
                    value: payload.title,
                });
            }

            let record = VersionedRecord::new(id, payload, Self::next_version(&stamp));
            guard.titles.remove(&previous_title);
            guard.titles.insert(record.payload.title.clone(), id);
            guard.rows.insert(id, record.clone());

            Ok(ConditionalWrite::Committed(record))
        })
    }

    fn insert(&self, payload: IssueFields) -> BoxFuture<'static, Result<Issue, StoreError>> {
        let table = Arc::clone(&self.table);
        let stamp = Arc::clone(&self.stamp);
        Box::pin(async move {
            let mut guard = table.write().await;

            if guard.titles.contains_key(&payload.title) {
                return Err(StoreError::UniqueViolation {
                    entity: ENTITY,
                    field: "title",
                    value: payload.title,
                });
            }

            let id = IssueId::generate();
            let record = VersionedRecord::new(id, payload, Self::next_version(&stamp));
            guard.titles.insert(record.payload.title.clone(), id);
            guard.rows.insert(id, record.clone());

            Ok(record)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
