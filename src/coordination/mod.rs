//! Coordination primitives for concurrent request handling.
//!
//! - [`IdempotencyCoordinator`]: single-flight execution per idempotency key
//!   with a time-bounded result cache
//! - [`OptimisticConcurrencyGuard`]: version-checked updates that turn lost
//!   updates into explicit conflicts
//!
//! Neither component depends on the HTTP layer.

pub mod clock;
pub mod error;
pub mod idempotency;
pub mod key;
pub mod optimistic;
pub mod version;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConcurrencyError, ConflictReason, IdempotencyError, SharedError};
pub use idempotency::{
    EntryState, Execution, ExecutionOrigin, IdempotencyConfig, IdempotencyCoordinator,
    IdempotencyEntry,
};
pub use key::{IdempotencyKey, MAX_KEY_LENGTH};
pub use optimistic::OptimisticConcurrencyGuard;
pub use version::{ParseVersionTokenError, VersionToken, VersionedRecord};
