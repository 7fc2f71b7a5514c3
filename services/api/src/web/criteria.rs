//! services/api/src/web/criteria.rs
//!
//! Handlers for a project's inclusion and exclusion criteria.

use crate::error::{core_error_response, port_error_response, HandlerError};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use rapid_review_core::access;
use rapid_review_core::criteria::{self, CategoryGroup, CriteriaGroups};
use rapid_review_core::{Criterion, CriterionDraft};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct CriterionRequest {
    pub text: String,
    /// Criteria without a category are listed under "Uncategorized".
    pub category: Option<String>,
    pub is_inclusion: bool,
}

impl From<CriterionRequest> for CriterionDraft {
    fn from(req: CriterionRequest) -> Self {
        Self {
            text: req.text,
            category: req.category,
            is_inclusion: req.is_inclusion,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CriterionResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub text: String,
    pub category: Option<String>,
    pub is_inclusion: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Criterion> for CriterionResponse {
    fn from(c: Criterion) -> Self {
        Self {
            id: c.id,
            project_id: c.project_id,
            text: c.text,
            category: c.category,
            is_inclusion: c.is_inclusion,
            created_at: c.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CategoryGroupResponse {
    pub category: String,
    pub criteria: Vec<CriterionResponse>,
}

impl From<CategoryGroup> for CategoryGroupResponse {
    fn from(group: CategoryGroup) -> Self {
        Self {
            category: group.category,
            criteria: group.criteria.into_iter().map(CriterionResponse::from).collect(),
        }
    }
}

/// Criteria split by kind, then grouped by category in alphabetical order.
#[derive(Serialize, ToSchema, Debug)]
pub struct CriteriaGroupsResponse {
    pub inclusion: Vec<CategoryGroupResponse>,
    pub exclusion: Vec<CategoryGroupResponse>,
}

impl From<CriteriaGroups> for CriteriaGroupsResponse {
    fn from(groups: CriteriaGroups) -> Self {
        Self {
            inclusion: groups.inclusion.into_iter().map(Into::into).collect(),
            exclusion: groups.exclusion.into_iter().map(Into::into).collect(),
        }
    }
}

/// Requires a senior role in the path's project, then rejects criterion ids
/// that belong to a different project. The role check runs first so outsiders
/// cannot learn which ids exist.
async fn ensure_in_project(
    app_state: &AppState,
    project_id: Uuid,
    criterion_id: Uuid,
    user_id: Uuid,
    action: &str,
) -> Result<(), HandlerError> {
    access::require_senior(app_state.db.as_ref(), project_id, user_id)
        .await
        .map_err(|e| core_error_response(action, e))?;
    let existing = app_state
        .db
        .get_criterion(criterion_id)
        .await
        .map_err(|e| port_error_response(action, e))?;
    if existing.project_id != project_id {
        return Err((StatusCode::NOT_FOUND, "Criterion not found".to_string()));
    }
    Ok(())
}

/// List the project's criteria, grouped.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/criteria",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Grouped criteria", body = CriteriaGroupsResponse),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn list_criteria_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let groups = criteria::list_criteria(app_state.db.as_ref(), project_id, user_id)
        .await
        .map_err(|e| core_error_response("load criteria", e))?;
    Ok(Json(CriteriaGroupsResponse::from(groups)))
}

/// Add a criterion. Senior reviewers and admins only.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/criteria",
    request_body = CriterionRequest,
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 201, description = "Criterion created", body = CriterionResponse),
        (status = 400, description = "Empty criterion text"),
        (status = 403, description = "Caller may not edit criteria")
    )
)]
pub async fn create_criterion_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CriterionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let draft = CriterionDraft::from(req);
    let criterion =
        criteria::create_criterion(app_state.db.as_ref(), project_id, user_id, &draft)
            .await
            .map_err(|e| core_error_response("create criterion", e))?;
    Ok((StatusCode::CREATED, Json(CriterionResponse::from(criterion))))
}

/// Replace a criterion's text, category and kind.
#[utoipa::path(
    put,
    path = "/projects/{project_id}/criteria/{criterion_id}",
    request_body = CriterionRequest,
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("criterion_id" = Uuid, Path, description = "Criterion id")
    ),
    responses(
        (status = 200, description = "Criterion updated", body = CriterionResponse),
        (status = 403, description = "Caller may not edit criteria"),
        (status = 404, description = "No such criterion")
    )
)]
pub async fn update_criterion_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((project_id, criterion_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CriterionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    ensure_in_project(&app_state, project_id, criterion_id, user_id, "update criterion").await?;
    let draft = CriterionDraft::from(req);
    let criterion =
        criteria::update_criterion(app_state.db.as_ref(), criterion_id, user_id, &draft)
            .await
            .map_err(|e| core_error_response("update criterion", e))?;
    Ok(Json(CriterionResponse::from(criterion)))
}

/// Delete a criterion.
#[utoipa::path(
    delete,
    path = "/projects/{project_id}/criteria/{criterion_id}",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("criterion_id" = Uuid, Path, description = "Criterion id")
    ),
    responses(
        (status = 204, description = "Criterion deleted"),
        (status = 403, description = "Caller may not edit criteria"),
        (status = 404, description = "No such criterion")
    )
)]
pub async fn delete_criterion_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((project_id, criterion_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HandlerError> {
    ensure_in_project(&app_state, project_id, criterion_id, user_id, "delete criterion").await?;
    criteria::delete_criterion(app_state.db.as_ref(), criterion_id, user_id)
        .await
        .map_err(|e| core_error_response("delete criterion", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask the language model for more criteria and store them.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/criteria/generate",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "The refreshed criteria", body = CriteriaGroupsResponse),
        (status = 403, description = "Caller may not edit criteria"),
        (status = 500, description = "Generation failed")
    )
)]
pub async fn generate_criteria_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let groups = criteria::generate_criteria(
        app_state.db.as_ref(),
        app_state.criteria_adapter.as_ref(),
        project_id,
        user_id,
    )
    .await
    .map_err(|e| core_error_response("generate criteria", e))?;
    Ok(Json(CriteriaGroupsResponse::from(groups)))
}
