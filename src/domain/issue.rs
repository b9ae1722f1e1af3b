//! Issue domain model.
//!
//! Issues are the records guarded by optimistic concurrency: their business
//! fields live in [`IssueFields`] and the store attaches the version.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordination::VersionedRecord;

/// Maximum title length in characters.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Unique identifier for an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueId(Uuid);

impl IssueId {
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new random `IssueId` (UUID v4).
    ///
    /// **Note**: This is an impure function (side effect: random number generation).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for IssueId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for IssueId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time as a `Timestamp`.
    ///
    /// **Note**: This is an impure function (side effect: system clock).
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// =============================================================================
// Issue
// =============================================================================

/// Mutable business fields of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFields {
    /// Unique, non-empty title.
    pub title: String,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl IssueFields {
    /// Creates the fields of a brand-new issue.
    ///
    /// This is a pure function; pass the creation time in.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>, now: Timestamp) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self
        }
    }

    /// Returns a copy with `updated_at` set to `now`.
    #[must_use]
    pub fn touched(self, now: Timestamp) -> Self {
        Self {
            updated_at: now,
            ..self
        }
    }
}

/// An issue as stored, with its current version.
pub type Issue = VersionedRecord<IssueId, IssueFields>;
