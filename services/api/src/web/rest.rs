//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{core_error_response, port_error_response, HandlerError};
use crate::web::{auth, criteria, state::AppState};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use rapid_review_core::access::require_member;
use rapid_review_core::conflicts::{self, ConflictDetails, ResolveOutcome};
use rapid_review_core::query::{get_filtered_papers, DEFAULT_PAGE_SIZE};
use rapid_review_core::{
    export, project, screening, Conflict, ConflictQueueState, CoreResult,
    DecisionFilter, NewPaper, PaperPage, PaperQuery, PaperView, Project, ProjectPaper, Review,
    Role, ScreeningFlow, ScreeningState, SortDirection, SortField,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        list_projects_handler,
        create_project_handler,
        project_overview_handler,
        set_member_role_handler,
        list_papers_handler,
        import_paper_handler,
        score_paper_handler,
        list_reviews_handler,
        get_note_handler,
        next_paper_handler,
        submit_review_handler,
        export_handler,
        next_conflict_handler,
        resolve_conflict_handler,
        criteria::list_criteria_handler,
        criteria::create_criterion_handler,
        criteria::update_criterion_handler,
        criteria::delete_criterion_handler,
        criteria::generate_criteria_handler,
    ),
    components(
        schemas(
            auth::SignupRequest, auth::LoginRequest, auth::AuthResponse,
            ProjectResponse, CreateProjectRequest, SetRoleRequest, OverviewResponse,
            PaperResponse, PaperPageResponse, ImportPaperRequest, ImportResponse, ScoreResponse,
            ReviewResponse, SubmitReviewRequest, SubmitReviewResponse, NextPaperResponse,
            NoteResponse,
            ConflictResponse, ConflictDetailsResponse, NextConflictResponse,
            ResolveConflictRequest, ResolveConflictResponse,
            criteria::CriterionRequest, criteria::CriterionResponse,
            criteria::CategoryGroupResponse, criteria::CriteriaGroupsResponse,
        )
    ),
    tags(
        (name = "RapidReview API", description = "API endpoints for systematic literature review screening.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub research_question: String,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// The caller's role in the project, when known.
    pub role: Option<String>,
}

impl ProjectResponse {
    fn new(project: Project, role: Option<Role>) -> Self {
        Self {
            id: project.id,
            name: project.name,
            research_question: project.research_question,
            keywords: project.keywords,
            created_at: project.created_at,
            role: role.map(|r| r.as_str().to_string()),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub name: String,
    pub research_question: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetRoleRequest {
    /// One of `admin`, `senior`, `reviewer`.
    pub role: String,
}

/// A project paper as the client sees it, with the caller's own decision.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct PaperResponse {
    pub id: Uuid,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub publication_date: Option<NaiveDate>,
    pub full_text_url: Option<String>,
    pub relevancy_score: Option<f64>,
    pub imported_at: DateTime<Utc>,
    /// `null` while the caller has not reviewed the paper.
    pub my_decision: Option<String>,
}

impl PaperResponse {
    pub fn from_entry(entry: ProjectPaper, my_decision: Option<String>) -> Self {
        Self {
            id: entry.paper.id,
            title: entry.paper.title,
            abstract_text: entry.paper.abstract_text,
            authors: entry.paper.authors,
            publication_date: entry.paper.publication_date,
            full_text_url: entry.paper.full_text_url,
            relevancy_score: entry.relevancy_score,
            imported_at: entry.imported_at,
            my_decision,
        }
    }
}

impl From<PaperView> for PaperResponse {
    fn from(view: PaperView) -> Self {
        let my_decision = view.my_decision.map(|d| d.as_str().to_string());
        Self::from_entry(view.entry, my_decision)
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaperPageResponse {
    pub papers: Vec<PaperResponse>,
    /// Papers matching the filter across all pages.
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl From<PaperPage> for PaperPageResponse {
    fn from(page: PaperPage) -> Self {
        let total_pages = page.total_pages();
        Self {
            papers: page.papers.into_iter().map(PaperResponse::from).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct OverviewResponse {
    pub project: ProjectResponse,
    pub papers: PaperPageResponse,
}

/// Query parameters for the paper list. Unknown literals are rejected with 400.
#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PapersQuery {
    /// `all`, `unreviewed`, `accept`, `reject` or `skip`.
    pub filter: Option<String>,
    /// `created_at`, `title`, `relevancy_score` or `publication_date`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub direction: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PapersQuery {
    pub fn to_query(&self) -> CoreResult<PaperQuery> {
        let defaults = PaperQuery::default();
        Ok(PaperQuery {
            filter: self
                .filter
                .as_deref()
                .map(str::parse::<DecisionFilter>)
                .transpose()?
                .unwrap_or(defaults.filter),
            sort: self
                .sort
                .as_deref()
                .map(str::parse::<SortField>)
                .transpose()?
                .unwrap_or(defaults.sort),
            direction: self
                .direction
                .as_deref()
                .map(str::parse::<SortDirection>)
                .transpose()?
                .unwrap_or(defaults.direction),
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ImportPaperRequest {
    pub title: String,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publication_date: Option<NaiveDate>,
    pub full_text_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ImportResponse {
    pub paper: PaperResponse,
    /// `null` when scoring failed; retry with the score endpoint.
    pub score: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct ScoreResponse {
    pub paper_id: Uuid,
    pub score: f64,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub paper_id: Uuid,
    pub reviewer_id: Uuid,
    pub decision: String,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            paper_id: review.paper_id,
            reviewer_id: review.reviewer_id,
            decision: review.decision.as_str().to_string(),
            created_at: review.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitReviewRequest {
    pub paper_id: Uuid,
    /// `accept`, `reject` or `skip`.
    pub decision: String,
}

/// `paper` is `null` once the caller has reviewed every paper.
#[derive(Serialize, ToSchema)]
pub struct NextPaperResponse {
    pub paper: Option<PaperResponse>,
    pub exhausted: bool,
}

impl From<ScreeningState> for NextPaperResponse {
    fn from(state: ScreeningState) -> Self {
        let exhausted = state.is_exhausted();
        Self {
            paper: presented(state),
            exhausted,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SubmitReviewResponse {
    pub review: ReviewResponse,
    /// The open conflict on this paper, if reviewers disagree.
    pub conflict: Option<ConflictResponse>,
    /// The next paper to screen; `null` once every paper is reviewed.
    pub next: Option<PaperResponse>,
    pub exhausted: bool,
}

#[derive(Serialize, ToSchema)]
pub struct NoteResponse {
    pub paper_id: Uuid,
    pub body: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ConflictResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub paper_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<Conflict> for ConflictResponse {
    fn from(conflict: Conflict) -> Self {
        Self {
            id: conflict.id,
            project_id: conflict.project_id,
            paper_id: conflict.paper_id,
            created_at: conflict.created_at,
            resolution: conflict.resolution.map(|d| d.as_str().to_string()),
            resolved_by: conflict.resolved_by,
            resolved_at: conflict.resolved_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ConflictDetailsResponse {
    pub conflict: ConflictResponse,
    pub paper: PaperResponse,
    /// Every reviewer's decision on the paper, oldest first.
    pub reviews: Vec<ReviewResponse>,
}

impl From<ConflictDetails> for ConflictDetailsResponse {
    fn from(details: ConflictDetails) -> Self {
        Self {
            conflict: details.conflict.into(),
            paper: PaperResponse::from_entry(details.paper, None),
            reviews: details.reviews.into_iter().map(ReviewResponse::from).collect(),
        }
    }
}

fn queue_response(state: ConflictQueueState) -> Option<ConflictDetailsResponse> {
    match state {
        ConflictQueueState::Pending(details) => Some(details.into()),
        ConflictQueueState::Empty => None,
    }
}

/// `conflict` is `null` when no unresolved conflict remains in scope.
#[derive(Serialize, ToSchema)]
pub struct NextConflictResponse {
    pub conflict: Option<ConflictDetailsResponse>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConflictScopeQuery {
    /// Narrows the queue to one project.
    pub project_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct ResolveConflictRequest {
    pub decision: String,
    /// Scope for the follow-up conflict; see `GET /conflicts/next`.
    pub project_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct ResolveConflictResponse {
    pub resolved: ConflictResponse,
    pub next: Option<ConflictDetailsResponse>,
}

impl From<ResolveOutcome> for ResolveConflictResponse {
    fn from(outcome: ResolveOutcome) -> Self {
        Self {
            resolved: outcome.resolved.into(),
            next: queue_response(outcome.next),
        }
    }
}

//=========================================================================================
// Project Handlers
//=========================================================================================

/// List the projects the caller belongs to.
#[utoipa::path(
    get,
    path = "/projects",
    responses(
        (status = 200, description = "Projects with the caller's role", body = [ProjectResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_projects_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let projects = project::list_projects(app_state.db.as_ref(), user_id)
        .await
        .map_err(|e| core_error_response("list projects", e))?;

    let response: Vec<ProjectResponse> = projects
        .into_iter()
        .map(|(project, role)| ProjectResponse::new(project, Some(role)))
        .collect();
    Ok(Json(response))
}

/// Create a project. The caller becomes its admin.
#[utoipa::path(
    post,
    path = "/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Empty name or research question")
    )
)]
pub async fn create_project_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let project = project::create_project(
        app_state.db.as_ref(),
        user_id,
        &req.name,
        &req.research_question,
        &req.keywords,
    )
    .await
    .map_err(|e| core_error_response("create project", e))?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse::new(project, Some(Role::Admin))),
    ))
}

/// Project details, the caller's role and the first page of papers.
#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project overview", body = OverviewResponse),
        (status = 403, description = "Not a project member"),
        (status = 404, description = "No such project")
    )
)]
pub async fn project_overview_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let overview = project::load_overview(app_state.db.as_ref(), project_id, user_id)
        .await
        .map_err(|e| core_error_response("load project", e))?;

    Ok(Json(OverviewResponse {
        project: ProjectResponse::new(overview.project, Some(overview.role)),
        papers: overview.papers.into(),
    }))
}

/// Grant a user a role in the project. Admins only.
#[utoipa::path(
    put,
    path = "/projects/{project_id}/members/{user_id}",
    request_body = SetRoleRequest,
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member to update")
    ),
    responses(
        (status = 204, description = "Role set"),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn set_member_role_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(actor_id): Extension<Uuid>,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let role: Role = req
        .role
        .parse()
        .map_err(|e| core_error_response("set member role", e))?;
    project::set_member_role(app_state.db.as_ref(), project_id, actor_id, member_id, role)
        .await
        .map_err(|e| core_error_response("set member role", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Paper Handlers
//=========================================================================================

/// One page of project papers with the caller's decisions.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/papers",
    params(("project_id" = Uuid, Path, description = "Project id"), PapersQuery),
    responses(
        (status = 200, description = "Filtered, sorted page of papers", body = PaperPageResponse),
        (status = 400, description = "Unknown filter, sort field or direction"),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn list_papers_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
    Query(params): Query<PapersQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let query = params
        .to_query()
        .map_err(|e| core_error_response("load papers", e))?;
    let page = get_filtered_papers(app_state.db.as_ref(), project_id, user_id, query)
        .await
        .map_err(|e| core_error_response("load papers", e))?;
    Ok(Json(PaperPageResponse::from(page)))
}

/// Import a paper and request its relevancy score. Senior reviewers and admins only.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/papers",
    request_body = ImportPaperRequest,
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 201, description = "Paper imported; score is null if scoring failed", body = ImportResponse),
        (status = 400, description = "Missing title"),
        (status = 403, description = "Caller may not import papers")
    )
)]
pub async fn import_paper_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<ImportPaperRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let paper = NewPaper {
        title: req.title,
        abstract_text: req.abstract_text,
        authors: req.authors,
        publication_date: req.publication_date,
        full_text_url: req.full_text_url,
    };
    let outcome = project::import_paper(
        app_state.db.as_ref(),
        app_state.relevancy_adapter.as_ref(),
        project_id,
        user_id,
        &paper,
    )
    .await
    .map_err(|e| core_error_response("import paper", e))?;

    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            paper: PaperResponse::from_entry(outcome.paper, None),
            score: outcome.score,
        }),
    ))
}

/// Recompute a paper's relevancy score.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/papers/{paper_id}/score",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("paper_id" = Uuid, Path, description = "Paper id")
    ),
    responses(
        (status = 200, description = "Score stored", body = ScoreResponse),
        (status = 403, description = "Caller may not score papers"),
        (status = 500, description = "Scoring function failed")
    )
)]
pub async fn score_paper_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((project_id, paper_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HandlerError> {
    let score = project::rescore_paper(
        app_state.db.as_ref(),
        app_state.relevancy_adapter.as_ref(),
        project_id,
        paper_id,
        user_id,
    )
    .await
    .map_err(|e| core_error_response("score paper", e))?;
    Ok(Json(ScoreResponse { paper_id, score }))
}

/// Every reviewer's decision on one paper.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/papers/{paper_id}/reviews",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("paper_id" = Uuid, Path, description = "Paper id")
    ),
    responses(
        (status = 200, description = "Reviews, oldest first", body = [ReviewResponse]),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn list_reviews_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((project_id, paper_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HandlerError> {
    let reviews = screening::list_paper_reviews(app_state.db.as_ref(), project_id, paper_id, user_id)
        .await
        .map_err(|e| core_error_response("load reviews", e))?;
    let response: Vec<ReviewResponse> = reviews.into_iter().map(ReviewResponse::from).collect();
    Ok(Json(response))
}

/// The caller's saved note on a paper. An empty body when nothing is saved.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/papers/{paper_id}/note",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("paper_id" = Uuid, Path, description = "Paper id")
    ),
    responses(
        (status = 200, description = "The caller's note", body = NoteResponse),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn get_note_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((project_id, paper_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HandlerError> {
    require_member(app_state.db.as_ref(), project_id, user_id)
        .await
        .map_err(|e| core_error_response("load note", e))?;
    let note = app_state
        .db
        .get_note(project_id, paper_id, user_id)
        .await
        .map_err(|e| port_error_response("load note", e))?;

    Ok(Json(NoteResponse {
        paper_id,
        updated_at: note.as_ref().map(|n| n.updated_at),
        body: note.map(|n| n.body).unwrap_or_default(),
    }))
}

//=========================================================================================
// Screening Handlers
//=========================================================================================

/// The next unreviewed paper for the caller, most relevant first.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/next",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Next paper to screen", body = NextPaperResponse),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn next_paper_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let state = ScreeningFlow::new(app_state.db.as_ref(), project_id, user_id)
        .next()
        .await
        .map_err(|e| core_error_response("load next paper", e))?;
    Ok(Json(NextPaperResponse::from(state)))
}

fn presented(state: ScreeningState) -> Option<PaperResponse> {
    match state {
        ScreeningState::Presenting(view) => Some(view.into()),
        ScreeningState::Exhausted => None,
    }
}

/// Record a decision and move to the next paper.
#[utoipa::path(
    post,
    path = "/projects/{project_id}/reviews",
    request_body = SubmitReviewRequest,
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 201, description = "Review recorded", body = SubmitReviewResponse),
        (status = 400, description = "Decision is not accept, reject or skip"),
        (status = 403, description = "Not a project member"),
        (status = 404, description = "Paper is not in the project")
    )
)]
pub async fn submit_review_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let outcome = ScreeningFlow::new(app_state.db.as_ref(), project_id, user_id)
        .submit(req.paper_id, &req.decision)
        .await
        .map_err(|e| core_error_response("submit review", e))?;

    let exhausted = outcome.next.is_exhausted();
    Ok((
        StatusCode::CREATED,
        Json(SubmitReviewResponse {
            review: outcome.review.into(),
            conflict: outcome.conflict.map(ConflictResponse::from),
            next: presented(outcome.next),
            exhausted,
        }),
    ))
}

//=========================================================================================
// Export Handler
//=========================================================================================

/// Download the project's papers, scores and decision tallies as CSV.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/export",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "CSV export", body = String, content_type = "text/csv"),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn export_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let csv = export::export_project_papers(app_state.db.as_ref(), project_id, user_id)
        .await
        .map_err(|e| core_error_response("export project papers", e))?;

    let disposition = format!("attachment; filename=\"project-{}.csv\"", project_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

//=========================================================================================
// Conflict Handlers
//=========================================================================================

/// The oldest unresolved conflict in scope, with the paper and every review.
#[utoipa::path(
    get,
    path = "/conflicts/next",
    params(ConflictScopeQuery),
    responses(
        (status = 200, description = "Next conflict, or null when the queue is empty", body = NextConflictResponse),
        (status = 400, description = "project_id missing while conflicts are scoped per project")
    )
)]
pub async fn next_conflict_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(params): Query<ConflictScopeQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let scope = app_state
        .config
        .conflict_scope
        .resolve(params.project_id)
        .map_err(|e| core_error_response("load conflict", e))?;
    let state = conflicts::next_conflict(app_state.db.as_ref(), user_id, scope)
        .await
        .map_err(|e| core_error_response("load conflict", e))?;

    Ok(Json(NextConflictResponse {
        conflict: queue_response(state),
    }))
}

/// Settle a conflict and load the next one. Senior reviewers and admins only.
#[utoipa::path(
    post,
    path = "/conflicts/{conflict_id}/resolve",
    request_body = ResolveConflictRequest,
    params(("conflict_id" = Uuid, Path, description = "Conflict id")),
    responses(
        (status = 200, description = "Conflict resolved", body = ResolveConflictResponse),
        (status = 400, description = "Invalid decision"),
        (status = 403, description = "Caller may not resolve conflicts"),
        (status = 404, description = "No such conflict"),
        (status = 409, description = "Conflict already resolved")
    )
)]
pub async fn resolve_conflict_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(conflict_id): Path<Uuid>,
    Json(req): Json<ResolveConflictRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let scope = app_state
        .config
        .conflict_scope
        .resolve(req.project_id)
        .map_err(|e| core_error_response("resolve conflict", e))?;
    let outcome = conflicts::resolve_conflict(
        app_state.db.as_ref(),
        conflict_id,
        &req.decision,
        user_id,
        scope,
    )
    .await
    .map_err(|e| core_error_response("resolve conflict", e))?;

    info!(conflict_id = %conflict_id, "Conflict resolved via REST");
    Ok(Json(ResolveConflictResponse::from(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rapid_review_core::CoreError;

    #[test]
    fn empty_query_uses_defaults() {
        let query = PapersQuery::default().to_query().unwrap();
        assert_eq!(query, PaperQuery::default());
    }

    #[test]
    fn query_literals_are_parsed() {
        let params = PapersQuery {
            filter: Some("unreviewed".to_string()),
            sort: Some("relevancy_score".to_string()),
            direction: Some("asc".to_string()),
            page: Some(3),
            per_page: Some(50),
        };
        let query = params.to_query().unwrap();
        assert_eq!(query.filter, DecisionFilter::Unreviewed);
        assert_eq!(query.sort, SortField::RelevancyScore);
        assert_eq!(query.direction, SortDirection::Asc);
        assert_eq!((query.page, query.per_page), (3, 50));
    }

    #[test]
    fn unknown_literals_are_validation_errors() {
        let params = PapersQuery {
            sort: Some("citations".to_string()),
            ..PapersQuery::default()
        };
        assert!(matches!(params.to_query(), Err(CoreError::Validation(_))));
    }
}
