//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rapid_review_core::domain::has_disagreement;
use rapid_review_core::ports::{DatabaseService, PortError, PortResult};
use rapid_review_core::query::{PaperPage, PaperQuery, SortDirection, SortField};
use rapid_review_core::{
    ConflictScope, Conflict, Criterion, CriterionDraft, Decision, ExportRow, NewPaper, Paper,
    PaperView, Project, ProjectPaper, Review, ReviewerNote, Role, UserCredentials, UserProfile,
};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// Error Helpers
//=========================================================================================

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn db_error_code(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned())
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps `RowNotFound` and foreign-key violations to `NotFound`, unique
/// violations to `Conflict`, and everything else to `Unexpected`.
fn classify(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    if matches!(e, sqlx::Error::RowNotFound) {
        return PortError::NotFound(what());
    }
    match db_error_code(&e).as_deref() {
        Some(FOREIGN_KEY_VIOLATION) => PortError::NotFound(what()),
        Some(UNIQUE_VIOLATION) => PortError::Conflict(e.to_string()),
        _ => unexpected(e),
    }
}

fn parse_decision(raw: &str) -> PortResult<Decision> {
    raw.parse()
        .map_err(|e: rapid_review_core::CoreError| PortError::Unexpected(e.to_string()))
}

fn parse_role(raw: &str) -> PortResult<Role> {
    raw.parse()
        .map_err(|e: rapid_review_core::CoreError| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    avatar_url: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            avatar_url: self.avatar_url,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ProjectRecord {
    id: Uuid,
    name: String,
    research_question: String,
    keywords: Vec<String>,
    created_at: DateTime<Utc>,
}
impl ProjectRecord {
    fn to_domain(self) -> Project {
        Project {
            id: self.id,
            name: self.name,
            research_question: self.research_question,
            keywords: self.keywords,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MembershipRecord {
    #[sqlx(flatten)]
    project: ProjectRecord,
    role: String,
}

#[derive(FromRow)]
struct ProjectPaperRecord {
    project_id: Uuid,
    paper_id: Uuid,
    title: String,
    abstract_text: String,
    authors: Vec<String>,
    publication_date: Option<NaiveDate>,
    full_text_url: Option<String>,
    relevancy_score: Option<f64>,
    imported_at: DateTime<Utc>,
}
impl ProjectPaperRecord {
    fn to_domain(self) -> ProjectPaper {
        ProjectPaper {
            project_id: self.project_id,
            paper: Paper {
                id: self.paper_id,
                title: self.title,
                abstract_text: self.abstract_text,
                authors: self.authors,
                publication_date: self.publication_date,
                full_text_url: self.full_text_url,
            },
            relevancy_score: self.relevancy_score,
            imported_at: self.imported_at,
        }
    }
}

#[derive(FromRow)]
struct PaperRowRecord {
    #[sqlx(flatten)]
    entry: ProjectPaperRecord,
    my_decision: Option<String>,
}
impl PaperRowRecord {
    fn to_domain(self) -> PortResult<PaperView> {
        let my_decision = self.my_decision.as_deref().map(parse_decision).transpose()?;
        Ok(PaperView {
            entry: self.entry.to_domain(),
            my_decision,
        })
    }
}

#[derive(FromRow)]
struct ReviewRecord {
    id: Uuid,
    project_id: Uuid,
    paper_id: Uuid,
    reviewer_id: Uuid,
    decision: String,
    created_at: DateTime<Utc>,
}
impl ReviewRecord {
    fn to_domain(self) -> PortResult<Review> {
        Ok(Review {
            id: self.id,
            project_id: self.project_id,
            paper_id: self.paper_id,
            reviewer_id: self.reviewer_id,
            decision: parse_decision(&self.decision)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ConflictRecord {
    id: Uuid,
    project_id: Uuid,
    paper_id: Uuid,
    created_at: DateTime<Utc>,
    resolution: Option<String>,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
}
impl ConflictRecord {
    fn to_domain(self) -> PortResult<Conflict> {
        Ok(Conflict {
            id: self.id,
            project_id: self.project_id,
            paper_id: self.paper_id,
            created_at: self.created_at,
            resolution: self.resolution.as_deref().map(parse_decision).transpose()?,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at,
        })
    }
}

#[derive(FromRow)]
struct CriterionRecord {
    id: Uuid,
    project_id: Uuid,
    text: String,
    category: Option<String>,
    is_inclusion: bool,
    created_at: DateTime<Utc>,
}
impl CriterionRecord {
    fn to_domain(self) -> Criterion {
        Criterion {
            id: self.id,
            project_id: self.project_id,
            text: self.text,
            category: self.category,
            is_inclusion: self.is_inclusion,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct NoteRecord {
    project_id: Uuid,
    paper_id: Uuid,
    user_id: Uuid,
    body: String,
    updated_at: DateTime<Utc>,
}
impl NoteRecord {
    fn to_domain(self) -> ReviewerNote {
        ReviewerNote {
            project_id: self.project_id,
            paper_id: self.paper_id,
            user_id: self.user_id,
            body: self.body,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// Shared SQL Fragments
//=========================================================================================

const USER_COLUMNS: &str = "id, email, first_name, last_name, avatar_url";
const PROJECT_COLUMNS: &str = "p.id, p.name, p.research_question, p.keywords, p.created_at";
const PROJECT_PAPER_COLUMNS: &str = "pp.project_id, p.id AS paper_id, p.title, \
     p.abstract AS abstract_text, p.authors, p.publication_date, p.full_text_url, \
     pp.relevancy_score, pp.imported_at";
const REVIEW_COLUMNS: &str = "id, project_id, paper_id, reviewer_id, decision, created_at";
const CONFLICT_COLUMNS: &str =
    "id, project_id, paper_id, created_at, resolution, resolved_by, resolved_at";
const CRITERION_COLUMNS: &str = "id, project_id, text, category, is_inclusion, created_at";
const NOTE_COLUMNS: &str = "project_id, paper_id, user_id, body, updated_at";

/// The filter shared by the count and page queries of `fetch_papers`.
/// `$1` project, `$2` reviewer, `$3` filter literal.
const PAPER_FILTER_SQL: &str = "FROM project_papers pp \
     JOIN papers p ON p.id = pp.paper_id \
     LEFT JOIN reviews r ON r.project_id = pp.project_id \
         AND r.paper_id = pp.paper_id AND r.reviewer_id = $2 \
     WHERE pp.project_id = $1 \
       AND ($3::text = 'all' \
            OR ($3::text = 'unreviewed' AND r.decision IS NULL) \
            OR r.decision = $3::text)";

/// `ORDER BY` clause built only from whitelisted column expressions.
/// Missing values sort last in either direction; the paper id breaks ties.
fn order_by_clause(sort: SortField, direction: SortDirection) -> String {
    let column = match sort {
        SortField::CreatedAt => "pp.imported_at",
        SortField::Title => "lower(p.title) COLLATE \"C\"",
        SortField::RelevancyScore => "pp.relevancy_score",
        SortField::PublicationDate => "p.publication_date",
    };
    let direction = match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    format!("ORDER BY {} {} NULLS LAST, p.id ASC", column, direction)
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- User Management & Auth ---

    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, email, hashed_password, first_name, last_name) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match db_error_code(&e).as_deref() {
            Some(UNIQUE_VIOLATION) => PortError::Conflict(format!("User {} already exists", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Projects & Membership ---

    async fn create_project(
        &self,
        owner_id: Uuid,
        name: &str,
        research_question: &str,
        keywords: &[String],
    ) -> PortResult<Project> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, ProjectRecord>(
            "INSERT INTO projects (id, name, research_question, keywords) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, research_question, keywords, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(research_question)
        .bind(keywords)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("INSERT INTO project_members (project_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(record.id)
            .bind(owner_id)
            .bind(Role::Admin.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_project(&self, project_id: Uuid) -> PortResult<Project> {
        let record = sqlx::query_as::<_, ProjectRecord>(&format!(
            "SELECT {} FROM projects p WHERE p.id = $1",
            PROJECT_COLUMNS
        ))
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("Project {} not found", project_id)))?;
        Ok(record.to_domain())
    }

    async fn list_projects_for_user(&self, user_id: Uuid) -> PortResult<Vec<(Project, Role)>> {
        let records = sqlx::query_as::<_, MembershipRecord>(&format!(
            "SELECT {}, m.role FROM projects p \
             JOIN project_members m ON m.project_id = p.id \
             WHERE m.user_id = $1 ORDER BY p.created_at ASC",
            PROJECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records
            .into_iter()
            .map(|r| Ok((r.project.to_domain(), parse_role(&r.role)?)))
            .collect()
    }

    async fn get_member_role(&self, project_id: Uuid, user_id: Uuid) -> PortResult<Option<Role>> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        role.as_deref().map(parse_role).transpose()
    }

    async fn set_member_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO project_members (project_id, user_id, role) VALUES ($1, $2, $3) \
             ON CONFLICT (project_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("Project {} not found", project_id)))?;
        Ok(())
    }

    // --- Papers ---

    async fn fetch_papers(
        &self,
        project_id: Uuid,
        reviewer_id: Uuid,
        query: &PaperQuery,
    ) -> PortResult<PaperPage> {
        let query = query.normalized();
        let filter = query.filter.as_str();

        let count_sql = format!("SELECT COUNT(*) {}", PAPER_FILTER_SQL);
        let page_sql = format!(
            "SELECT {}, r.decision AS my_decision {} {} LIMIT $4 OFFSET $5",
            PROJECT_PAPER_COLUMNS,
            PAPER_FILTER_SQL,
            order_by_clause(query.sort, query.direction)
        );

        let count = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(project_id)
            .bind(reviewer_id)
            .bind(filter)
            .fetch_one(&self.pool);
        let rows = sqlx::query_as::<_, PaperRowRecord>(&page_sql)
            .bind(project_id)
            .bind(reviewer_id)
            .bind(filter)
            .bind(i64::from(query.per_page))
            .bind(query.offset() as i64)
            .fetch_all(&self.pool);
        let (total, rows) = futures::try_join!(count, rows).map_err(unexpected)?;

        let papers = rows
            .into_iter()
            .map(PaperRowRecord::to_domain)
            .collect::<PortResult<Vec<_>>>()?;
        debug!(project_id = %project_id, total, returned = papers.len(), "Fetched paper page");

        Ok(PaperPage {
            papers,
            total: total.max(0) as u64,
            page: query.page,
            per_page: query.per_page,
        })
    }

    async fn get_project_paper(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
    ) -> PortResult<ProjectPaper> {
        let record = sqlx::query_as::<_, ProjectPaperRecord>(&format!(
            "SELECT {} FROM project_papers pp JOIN papers p ON p.id = pp.paper_id \
             WHERE pp.project_id = $1 AND pp.paper_id = $2",
            PROJECT_PAPER_COLUMNS
        ))
        .bind(project_id)
        .bind(paper_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            classify(e, || {
                format!("Paper {} not found in project {}", paper_id, project_id)
            })
        })?;
        Ok(record.to_domain())
    }

    async fn insert_paper(&self, project_id: Uuid, paper: &NewPaper) -> PortResult<ProjectPaper> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let paper_id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO papers (id, title, abstract, authors, publication_date, full_text_url) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(paper_id)
        .bind(&paper.title)
        .bind(&paper.abstract_text)
        .bind(&paper.authors)
        .bind(paper.publication_date)
        .bind(&paper.full_text_url)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        let imported_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "INSERT INTO project_papers (project_id, paper_id) VALUES ($1, $2) RETURNING imported_at",
        )
        .bind(project_id)
        .bind(paper_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, || format!("Project {} not found", project_id)))?;

        tx.commit().await.map_err(unexpected)?;

        Ok(ProjectPaper {
            project_id,
            paper: Paper {
                id: paper_id,
                title: paper.title.clone(),
                abstract_text: paper.abstract_text.clone(),
                authors: paper.authors.clone(),
                publication_date: paper.publication_date,
                full_text_url: paper.full_text_url.clone(),
            },
            relevancy_score: None,
            imported_at,
        })
    }

    async fn set_relevancy_score(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        score: f64,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE project_papers SET relevancy_score = $3 WHERE project_id = $1 AND paper_id = $2",
        )
        .bind(project_id)
        .bind(paper_id)
        .bind(score)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Paper {} not found", paper_id)));
        }
        Ok(())
    }

    // --- Reviews & Conflicts ---

    async fn fetch_reviews(
        &self,
        project_id: Uuid,
        paper_id: Option<Uuid>,
        reviewer_id: Option<Uuid>,
    ) -> PortResult<Vec<Review>> {
        let records = sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {} FROM reviews WHERE project_id = $1 \
             AND ($2::uuid IS NULL OR paper_id = $2) \
             AND ($3::uuid IS NULL OR reviewer_id = $3) \
             ORDER BY created_at ASC, id ASC",
            REVIEW_COLUMNS
        ))
        .bind(project_id)
        .bind(paper_id)
        .bind(reviewer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(ReviewRecord::to_domain).collect()
    }

    async fn upsert_review(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        reviewer_id: Uuid,
        decision: Decision,
    ) -> PortResult<Review> {
        let record = sqlx::query_as::<_, ReviewRecord>(&format!(
            "INSERT INTO reviews (id, project_id, paper_id, reviewer_id, decision) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (project_id, paper_id, reviewer_id) \
             DO UPDATE SET decision = EXCLUDED.decision, created_at = clock_timestamp() \
             RETURNING {}",
            REVIEW_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(paper_id)
        .bind(reviewer_id)
        .bind(decision.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            classify(e, || {
                format!("Paper {} not found in project {}", paper_id, project_id)
            })
        })?;
        record.to_domain()
    }

    async fn check_for_conflict(&self, review_id: Uuid) -> PortResult<Option<Conflict>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let review = sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {} FROM reviews WHERE id = $1",
            REVIEW_COLUMNS
        ))
        .bind(review_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, || format!("Review {} not found", review_id)))?
        .to_domain()?;

        let open_sql = format!(
            "SELECT {} FROM conflicts \
             WHERE project_id = $1 AND paper_id = $2 AND resolution IS NULL",
            CONFLICT_COLUMNS
        );
        let open = sqlx::query_as::<_, ConflictRecord>(&open_sql)
            .bind(review.project_id)
            .bind(review.paper_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?;
        if let Some(open) = open {
            tx.commit().await.map_err(unexpected)?;
            return open.to_domain().map(Some);
        }

        let others = sqlx::query_as::<_, ReviewRecord>(&format!(
            "SELECT {} FROM reviews WHERE project_id = $1 AND paper_id = $2",
            REVIEW_COLUMNS
        ))
        .bind(review.project_id)
        .bind(review.paper_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(ReviewRecord::to_domain)
        .collect::<PortResult<Vec<_>>>()?;

        if !has_disagreement(&review, &others) {
            tx.commit().await.map_err(unexpected)?;
            return Ok(None);
        }

        // A concurrent check may have opened the conflict first; the partial
        // unique index keeps one open conflict per paper.
        let inserted = sqlx::query_as::<_, ConflictRecord>(&format!(
            "INSERT INTO conflicts (id, project_id, paper_id) VALUES ($1, $2, $3) \
             ON CONFLICT (project_id, paper_id) WHERE resolution IS NULL DO NOTHING \
             RETURNING {}",
            CONFLICT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(review.project_id)
        .bind(review.paper_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;

        let conflict = match inserted {
            Some(record) => record,
            None => sqlx::query_as::<_, ConflictRecord>(&open_sql)
                .bind(review.project_id)
                .bind(review.paper_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?,
        };
        tx.commit().await.map_err(unexpected)?;
        conflict.to_domain().map(Some)
    }

    async fn oldest_unresolved_conflict(
        &self,
        user_id: Uuid,
        scope: ConflictScope,
    ) -> PortResult<Option<Conflict>> {
        let project_id = match scope {
            ConflictScope::Global => None,
            ConflictScope::Project(id) => Some(id),
        };
        let record = sqlx::query_as::<_, ConflictRecord>(
            "SELECT c.id, c.project_id, c.paper_id, c.created_at, c.resolution, \
                    c.resolved_by, c.resolved_at \
             FROM conflicts c \
             JOIN project_members m ON m.project_id = c.project_id AND m.user_id = $1 \
                  AND m.role IN ('admin', 'senior') \
             WHERE c.resolution IS NULL AND ($2::uuid IS NULL OR c.project_id = $2) \
             ORDER BY c.created_at ASC, c.id ASC \
             LIMIT 1",
        )
        .bind(user_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record.map(ConflictRecord::to_domain).transpose()
    }

    async fn get_conflict(&self, conflict_id: Uuid) -> PortResult<Conflict> {
        sqlx::query_as::<_, ConflictRecord>(&format!(
            "SELECT {} FROM conflicts WHERE id = $1",
            CONFLICT_COLUMNS
        ))
        .bind(conflict_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("Conflict {} not found", conflict_id)))?
        .to_domain()
    }

    async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Decision,
        resolver_id: Uuid,
    ) -> PortResult<Conflict> {
        let updated = sqlx::query_as::<_, ConflictRecord>(&format!(
            "UPDATE conflicts SET resolution = $2, resolved_by = $3, resolved_at = now() \
             WHERE id = $1 AND resolution IS NULL RETURNING {}",
            CONFLICT_COLUMNS
        ))
        .bind(conflict_id)
        .bind(resolution.as_str())
        .bind(resolver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match updated {
            Some(record) => record.to_domain(),
            // Nothing updated: either the conflict is gone or someone resolved it first.
            None => {
                let existing = self.get_conflict(conflict_id).await?;
                Err(PortError::Conflict(format!(
                    "Conflict {} is already resolved",
                    existing.id
                )))
            }
        }
    }

    // --- Criteria ---

    async fn list_criteria(&self, project_id: Uuid) -> PortResult<Vec<Criterion>> {
        let records = sqlx::query_as::<_, CriterionRecord>(&format!(
            "SELECT {} FROM criteria WHERE project_id = $1 ORDER BY created_at ASC, id ASC",
            CRITERION_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(CriterionRecord::to_domain).collect())
    }

    async fn get_criterion(&self, criterion_id: Uuid) -> PortResult<Criterion> {
        let record = sqlx::query_as::<_, CriterionRecord>(&format!(
            "SELECT {} FROM criteria WHERE id = $1",
            CRITERION_COLUMNS
        ))
        .bind(criterion_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("Criterion {} not found", criterion_id)))?;
        Ok(record.to_domain())
    }

    async fn create_criterion(
        &self,
        project_id: Uuid,
        draft: &CriterionDraft,
    ) -> PortResult<Criterion> {
        let record = sqlx::query_as::<_, CriterionRecord>(&format!(
            "INSERT INTO criteria (id, project_id, text, category, is_inclusion) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            CRITERION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(&draft.text)
        .bind(&draft.category)
        .bind(draft.is_inclusion)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("Project {} not found", project_id)))?;
        Ok(record.to_domain())
    }

    async fn update_criterion(
        &self,
        criterion_id: Uuid,
        draft: &CriterionDraft,
    ) -> PortResult<Criterion> {
        let record = sqlx::query_as::<_, CriterionRecord>(&format!(
            "UPDATE criteria SET text = $2, category = $3, is_inclusion = $4 \
             WHERE id = $1 RETURNING {}",
            CRITERION_COLUMNS
        ))
        .bind(criterion_id)
        .bind(&draft.text)
        .bind(&draft.category)
        .bind(draft.is_inclusion)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("Criterion {} not found", criterion_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_criterion(&self, criterion_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM criteria WHERE id = $1")
            .bind(criterion_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Criterion {} not found",
                criterion_id
            )));
        }
        Ok(())
    }

    // --- Notes ---

    async fn save_note(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        user_id: Uuid,
        body: &str,
    ) -> PortResult<ReviewerNote> {
        let record = sqlx::query_as::<_, NoteRecord>(&format!(
            "INSERT INTO reviewer_notes (project_id, paper_id, user_id, body) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (project_id, paper_id, user_id) \
             DO UPDATE SET body = EXCLUDED.body, updated_at = now() \
             RETURNING {}",
            NOTE_COLUMNS
        ))
        .bind(project_id)
        .bind(paper_id)
        .bind(user_id)
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            classify(e, || {
                format!("Paper {} not found in project {}", paper_id, project_id)
            })
        })?;
        Ok(record.to_domain())
    }

    async fn get_note(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<ReviewerNote>> {
        let record = sqlx::query_as::<_, NoteRecord>(&format!(
            "SELECT {} FROM reviewer_notes \
             WHERE project_id = $1 AND paper_id = $2 AND user_id = $3",
            NOTE_COLUMNS
        ))
        .bind(project_id)
        .bind(paper_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(NoteRecord::to_domain))
    }

    // --- Export ---

    async fn fetch_export_rows(&self, project_id: Uuid) -> PortResult<Vec<ExportRow>> {
        let entries_sql = format!(
            "SELECT {} FROM project_papers pp JOIN papers p ON p.id = pp.paper_id \
             WHERE pp.project_id = $1 ORDER BY pp.imported_at ASC, p.id ASC",
            PROJECT_PAPER_COLUMNS
        );
        let entries = sqlx::query_as::<_, ProjectPaperRecord>(&entries_sql)
            .bind(project_id)
            .fetch_all(&self.pool);
        let resolutions = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT DISTINCT ON (paper_id) paper_id, resolution FROM conflicts \
             WHERE project_id = $1 AND resolution IS NOT NULL \
             ORDER BY paper_id, resolved_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool);

        let (entries, resolutions) =
            futures::try_join!(entries, resolutions).map_err(unexpected)?;
        let reviews = self.fetch_reviews(project_id, None, None).await?;

        let mut reviews_by_paper: HashMap<Uuid, Vec<Review>> = HashMap::new();
        for review in reviews {
            reviews_by_paper.entry(review.paper_id).or_default().push(review);
        }
        let resolutions = resolutions
            .into_iter()
            .map(|(paper_id, raw)| Ok((paper_id, parse_decision(&raw)?)))
            .collect::<PortResult<HashMap<Uuid, Decision>>>()?;

        Ok(entries
            .into_iter()
            .map(|record| {
                let entry = record.to_domain();
                let paper_id = entry.paper.id;
                ExportRow {
                    reviews: reviews_by_paper.remove(&paper_id).unwrap_or_default(),
                    resolution: resolutions.get(&paper_id).copied(),
                    entry,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn order_by_keeps_missing_values_last_and_breaks_ties_by_id() {
        assert_eq!(
            order_by_clause(SortField::RelevancyScore, SortDirection::Desc),
            "ORDER BY pp.relevancy_score DESC NULLS LAST, p.id ASC"
        );
        assert_eq!(
            order_by_clause(SortField::PublicationDate, SortDirection::Asc),
            "ORDER BY p.publication_date ASC NULLS LAST, p.id ASC"
        );
    }

    #[test]
    fn title_order_uses_byte_collation() {
        // Matches the in-memory store, which compares lowercased titles byte by byte.
        assert_eq!(
            order_by_clause(SortField::Title, SortDirection::Asc),
            "ORDER BY lower(p.title) COLLATE \"C\" ASC NULLS LAST, p.id ASC"
        );
        assert_eq!(
            order_by_clause(SortField::Title, SortDirection::Desc),
            "ORDER BY lower(p.title) COLLATE \"C\" DESC NULLS LAST, p.id ASC"
        );
    }

    #[test]
    fn unknown_stored_literals_are_unexpected() {
        assert!(matches!(parse_decision("maybe"), Err(PortError::Unexpected(_))));
        assert!(matches!(parse_role("owner"), Err(PortError::Unexpected(_))));
        assert_eq!(parse_role("senior").unwrap(), Role::Senior);
    }
}
