//! crates/rapid_review_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the backing store and of the server-side functions
//! (criteria generation, relevancy scoring).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::conflicts::ConflictScope;
use crate::domain::{
    Conflict, Criterion, CriterionDraft, Decision, ExportRow, NewPaper, Paper, Project,
    ProjectPaper, Review, ReviewerNote, Role, UserCredentials, UserProfile,
};
use crate::query::{PaperPage, PaperQuery};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The write collides with the current state (duplicate key, already resolved, ...).
    #[error("Conflicting state: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The backing store. Row-level authority lives behind this trait; the core
/// only re-checks project roles as a convenience before mutating.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management & Auth ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> PortResult<UserProfile>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_profile(&self, user_id: Uuid) -> PortResult<UserProfile>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Projects & Membership ---
    /// Creates a project and makes `owner_id` its admin.
    async fn create_project(
        &self,
        owner_id: Uuid,
        name: &str,
        research_question: &str,
        keywords: &[String],
    ) -> PortResult<Project>;

    async fn get_project(&self, project_id: Uuid) -> PortResult<Project>;

    async fn list_projects_for_user(&self, user_id: Uuid) -> PortResult<Vec<(Project, Role)>>;

    async fn get_member_role(&self, project_id: Uuid, user_id: Uuid) -> PortResult<Option<Role>>;

    async fn set_member_role(&self, project_id: Uuid, user_id: Uuid, role: Role)
        -> PortResult<()>;

    // --- Papers ---
    /// Returns one page of project papers annotated with `reviewer_id`'s decisions.
    /// The decision filter is applied before counting and paginating.
    async fn fetch_papers(
        &self,
        project_id: Uuid,
        reviewer_id: Uuid,
        query: &PaperQuery,
    ) -> PortResult<PaperPage>;

    async fn get_project_paper(&self, project_id: Uuid, paper_id: Uuid)
        -> PortResult<ProjectPaper>;

    async fn insert_paper(&self, project_id: Uuid, paper: &NewPaper) -> PortResult<ProjectPaper>;

    async fn set_relevancy_score(&self, project_id: Uuid, paper_id: Uuid, score: f64)
        -> PortResult<()>;

    // --- Reviews & Conflicts ---
    /// Reviews for a project, optionally narrowed to one paper and/or one reviewer.
    async fn fetch_reviews(
        &self,
        project_id: Uuid,
        paper_id: Option<Uuid>,
        reviewer_id: Option<Uuid>,
    ) -> PortResult<Vec<Review>>;

    /// Records a decision; a reviewer's later decision on the same paper replaces the earlier one.
    async fn upsert_review(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        reviewer_id: Uuid,
        decision: Decision,
    ) -> PortResult<Review>;

    /// Server-side conflict detection keyed by a freshly written review.
    /// Returns the conflict opened (or already open) for the review's paper, if any.
    async fn check_for_conflict(&self, review_id: Uuid) -> PortResult<Option<Conflict>>;

    /// The oldest open conflict within `scope`, restricted to projects where `user_id` is senior or admin.
    async fn oldest_unresolved_conflict(
        &self,
        user_id: Uuid,
        scope: ConflictScope,
    ) -> PortResult<Option<Conflict>>;

    async fn get_conflict(&self, conflict_id: Uuid) -> PortResult<Conflict>;

    /// Closes an open conflict. Fails with `PortError::Conflict` when it is already resolved.
    async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Decision,
        resolver_id: Uuid,
    ) -> PortResult<Conflict>;

    // --- Criteria ---
    async fn list_criteria(&self, project_id: Uuid) -> PortResult<Vec<Criterion>>;

    async fn get_criterion(&self, criterion_id: Uuid) -> PortResult<Criterion>;

    async fn create_criterion(&self, project_id: Uuid, draft: &CriterionDraft)
        -> PortResult<Criterion>;

    async fn update_criterion(&self, criterion_id: Uuid, draft: &CriterionDraft)
        -> PortResult<Criterion>;

    async fn delete_criterion(&self, criterion_id: Uuid) -> PortResult<()>;

    // --- Notes ---
    async fn save_note(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        user_id: Uuid,
        body: &str,
    ) -> PortResult<ReviewerNote>;

    async fn get_note(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<ReviewerNote>>;

    // --- Export ---
    async fn fetch_export_rows(&self, project_id: Uuid) -> PortResult<Vec<ExportRow>>;
}

#[async_trait]
pub trait CriteriaGenerationService: Send + Sync {
    /// Proposes screening criteria for a project, given the criteria it already has.
    async fn generate_criteria(
        &self,
        project: &Project,
        existing: &[Criterion],
    ) -> PortResult<Vec<CriterionDraft>>;
}

#[async_trait]
pub trait RelevancyScoringService: Send + Sync {
    /// Estimates how relevant a paper is to the project's research question, in `[0, 1]`.
    async fn score_paper(&self, project: &Project, paper: &Paper) -> PortResult<f64>;
}
