//! Data Transfer Objects for the API.

use serde::{Deserialize, Serialize};

use super::error::{FieldError, ValidationError};
use crate::coordination::VersionToken;
use crate::domain::{Issue, MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH, Timestamp};

// =============================================================================
// Request DTOs
// =============================================================================

/// Request body of `POST /issues`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIssueRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body of `PUT /issues/{id}`.
///
/// Absent fields keep their current value. `version` is the token the
/// client last saw; when present, the update is rejected if the issue has
/// changed since.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateIssueRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Validated update, ready to apply to the stored fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub version: Option<VersionToken>,
}

impl UpdateIssueRequest {
    /// Validates every supplied field, collecting all failures.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` listing each invalid field.
    pub fn validate(&self) -> Result<ValidatedUpdate, ValidationError> {
        let mut errors = Vec::new();

        let title = self
            .title
            .as_deref()
            .map(validate_title)
            .transpose()
            .unwrap_or_else(|error| {
                errors.extend(error.errors);
                None
            });

        let description = self
            .description
            .as_deref()
            .map(validate_description)
            .transpose()
            .unwrap_or_else(|error| {
                errors.extend(error.errors);
                None
            });

        let version = self
            .version
            .as_deref()
            .map(str::parse::<VersionToken>)
            .transpose()
            .unwrap_or_else(|error| {
                errors.push(FieldError::new("version", error.to_string()));
                None
            });

        if errors.is_empty() {
            Ok(ValidatedUpdate {
                title,
                description,
                version,
            })
        } else {
            Err(ValidationError::new(errors))
        }
    }
}

// =============================================================================
// Response DTOs
// =============================================================================

/// Response DTO for an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Concurrency token to send back with the next update.
    pub version: VersionToken,
}

impl From<&Issue> for IssueResponse {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.to_string(),
            title: issue.payload.title.clone(),
            description: issue.payload.description.clone(),
            created_at: issue.payload.created_at,
            updated_at: issue.payload.updated_at,
            version: issue.version,
        }
    }
}

// =============================================================================
// Validation Functions
// =============================================================================

/// Validates and trims an issue title.
///
/// # Validation Rules
///
/// - Title must not be empty
/// - Title must not exceed 500 characters
///
/// # Errors
///
/// Returns `ValidationError` on the `title` field.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::single("title", "Title is required"));
    }

    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::single(
            "title",
            format!("Title must not exceed {MAX_TITLE_LENGTH} characters"),
        ));
    }

    Ok(title.to_string())
}

/// Validates and trims an issue description.
///
/// # Errors
///
/// Returns `ValidationError` on the `description` field if it exceeds 2000
/// characters.
pub fn validate_description(description: &str) -> Result<String, ValidationError> {
    let description = description.trim();

    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::single(
            "description",
            format!("Description must not exceed {MAX_DESCRIPTION_LENGTH} characters"),
        ));
    }

    Ok(description.to_string())
}
