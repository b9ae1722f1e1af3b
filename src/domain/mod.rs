//! Domain module.
//!
//! Issues (guarded by optimistic concurrency) and processing results (shared
//! through the idempotency coordinator).

pub mod issue;
pub mod processing;

pub use issue::{
    Issue, IssueFields, IssueId, MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH, Timestamp,
};
pub use processing::{ProcessRequest, ProcessedResult};
