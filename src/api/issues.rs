//! Issue handlers guarded by optimistic concurrency.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION},
};

use super::dto::{
    CreateIssueRequest, IssueResponse, UpdateIssueRequest, validate_description, validate_title,
};
use super::error::{ApiErrorResponse, FieldError, ValidationError};
use super::handlers::AppState;
use crate::domain::{IssueFields, IssueId, Timestamp};

// =============================================================================
// POST /issues Handler
// =============================================================================

/// Creates a new issue.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Unique title",
///   "description": "Optional description"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the issue, with `Location: /issues/{id}`
/// - **400 Bad Request**: validation error
/// - **409 Conflict**: an issue with the same title already exists
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the cases above and 503 when storage is
/// unavailable.
pub async fn create_issue(
    State(state): State<AppState>,
    Json(request): Json<CreateIssueRequest>,
) -> Result<(StatusCode, HeaderMap, Json<IssueResponse>), ApiErrorResponse> {
    let fields = validate_create_request(&request)?;

    let issue = state.issues.create(fields).await?;
    let response = IssueResponse::from(&issue);

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/issues/{}", issue.id)) {
        headers.insert(LOCATION, location);
    }

    tracing::info!(id = %issue.id, title = %issue.payload.title, "Issue created");
    Ok((StatusCode::CREATED, headers, Json(response)))
}

fn validate_create_request(request: &CreateIssueRequest) -> Result<IssueFields, ValidationError> {
    let title = validate_title(&request.title);
    let description = validate_description(request.description.as_deref().unwrap_or_default());

    match (title, description) {
        (Ok(title), Ok(description)) => Ok(IssueFields::new(title, description, Timestamp::now())),
        (title, description) => {
            let errors: Vec<FieldError> = [title.err(), description.err()]
                .into_iter()
                .flatten()
                .flat_map(|error| error.errors)
                .collect();
            Err(ValidationError::new(errors))
        }
    }
}

// =============================================================================
// GET /issues/{id} Handler
// =============================================================================

/// Returns an issue together with its current version.
///
/// # Errors
///
/// - 404 if the issue does not exist or the id is not a UUID
/// - 503 if storage is unavailable
pub async fn get_issue(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<IssueResponse>, ApiErrorResponse> {
    let id = parse_issue_id(&raw_id)?;
    let issue = state.issues.fetch(&id).await?;
    Ok(Json(IssueResponse::from(&issue)))
}

// =============================================================================
// PUT /issues/{id} Handler
// =============================================================================

/// Updates an issue.
///
/// The handler reads the issue, waits for the configured update delay, and
/// writes conditionally on the version it read. Two requests racing on the
/// same version therefore produce one 200 and one 409, never a lost update.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "New title",
///   "description": "New description",
///   "version": "0000000000000001"
/// }
/// ```
///
/// Every field is optional.
///
/// # Errors
///
/// - 400 on validation errors
/// - 404 if the issue does not exist
/// - 409 if the issue changed since `version` or since it was read, or if
///   the new title is taken
/// - 503 if storage is unavailable
pub async fn update_issue(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(request): Json<UpdateIssueRequest>,
) -> Result<Json<IssueResponse>, ApiErrorResponse> {
    let id = parse_issue_id(&raw_id)?;
    let update = request.validate()?;
    let delay = state.config.update_delay;

    let issue = state
        .issues
        .update(&id, update.version, |fields| async move {
            tokio::time::sleep(delay).await;
            apply_update(fields, update.title, update.description, Timestamp::now())
        })
        .await?;

    tracing::info!(%id, version = %issue.version, "Issue updated");
    Ok(Json(IssueResponse::from(&issue)))
}

/// Applies the supplied fields and stamps `updated_at`.
fn apply_update(
    fields: IssueFields,
    title: Option<String>,
    description: Option<String>,
    now: Timestamp,
) -> IssueFields {
    let fields = match title {
        Some(title) => fields.with_title(title),
        None => fields,
    };
    let fields = match description {
        Some(description) => fields.with_description(description),
        None => fields,
    };
    fields.touched(now)
}

fn parse_issue_id(raw: &str) -> Result<IssueId, ApiErrorResponse> {
    raw.parse()
        .map_err(|_| ApiErrorResponse::not_found(format!("Issue with ID {raw} not found.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::AppConfig;
    use rstest::{fixture, rstest};
    use std::time::Duration;

    #[fixture]
    fn state() -> AppState {
        AppState::in_memory(
            AppConfig::builder()
                .update_delay(Duration::from_millis(100))
                .build()
                .unwrap(),
        )
    }

    async fn create(state: &AppState, title: &str) -> IssueResponse {
        let (_, _, Json(issue)) = create_issue(
            State(state.clone()),
            Json(CreateIssueRequest {
                title: title.to_string(),
                description: None,
            }),
        )
        .await
        .unwrap();
        issue
    }

    fn rename(title: &str, version: Option<&IssueResponse>) -> Json<UpdateIssueRequest> {
        Json(UpdateIssueRequest {
            title: Some(title.to_string()),
            description: None,
            version: version.map(|issue| issue.version.to_string()),
        })
    }

    #[rstest]
    #[tokio::test]
    async fn create_returns_location(state: AppState) {
        let (status, headers, Json(issue)) = create_issue(
            State(state),
            Json(CreateIssueRequest {
                title: " T1 ".to_string(),
                description: Some("first".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issue.title, "T1");
        assert_eq!(
            headers.get(LOCATION).unwrap(),
            format!("/issues/{}", issue.id).as_str()
        );
    }

    #[rstest]
    #[tokio::test]
    async fn create_reports_every_invalid_field(state: AppState) {
        let error = create_issue(
            State(state),
            Json(CreateIssueRequest {
                title: String::new(),
                description: Some("a".repeat(2001)),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error.details.map(|details| details.len()), Some(2));
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_title_is_conflict(state: AppState) {
        create(&state, "T1").await;

        let error = create_issue(
            State(state),
            Json(CreateIssueRequest {
                title: "T1".to_string(),
                description: None,
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(error.status, StatusCode::CONFLICT);
        assert_eq!(error.error.message, "An issue with title 'T1' already exists.");
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn update_changes_fields_and_version(state: AppState) {
        let created = create(&state, "T1").await;

        let Json(updated) = update_issue(
            State(state.clone()),
            Path(created.id.clone()),
            rename("T2", Some(&created)),
        )
        .await
        .unwrap();

        assert_eq!(updated.title, "T2");
        assert_ne!(updated.version, created.version);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn racing_updates_produce_one_conflict(state: AppState) {
        let created = create(&state, "T1").await;

        let (first, second) = tokio::join!(
            update_issue(
                State(state.clone()),
                Path(created.id.clone()),
                rename("first", Some(&created)),
            ),
            update_issue(
                State(state.clone()),
                Path(created.id.clone()),
                rename("second", Some(&created)),
            ),
        );

        let statuses = [&first, &second].map(|outcome| {
            outcome
                .as_ref()
                .map_or_else(|error| error.status, |_| StatusCode::OK)
        });
        assert!(statuses.contains(&StatusCode::OK));
        assert!(statuses.contains(&StatusCode::CONFLICT));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn update_of_unknown_issue_is_not_found(state: AppState) {
        let id = IssueId::generate().to_string();
        let error = update_issue(State(state), Path(id.clone()), rename("T2", None))
            .await
            .unwrap_err();

        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.error.message, format!("Issue with ID {id} not found."));
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_id_is_not_found(state: AppState) {
        let error = get_issue(State(state), Path("not-a-uuid".to_string()))
            .await
            .unwrap_err();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    fn apply_update_keeps_absent_fields() {
        let created = Timestamp::now();
        let fields = IssueFields::new("T1", "first", created);

        let updated = apply_update(fields, None, Some("second".to_string()), created);

        assert_eq!(updated.title, "T1");
        assert_eq!(updated.description, "second");
    }
}
