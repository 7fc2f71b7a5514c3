//! crates/rapid_review_core/src/project.rs
//!
//! Project-level operations: creating projects, managing roles, the project
//! overview, and importing papers with their relevancy score.

use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{require_admin, require_senior};
use crate::domain::{NewPaper, Project, ProjectPaper, Role};
use crate::error::{CoreError, CoreResult};
use crate::ports::{DatabaseService, RelevancyScoringService};
use crate::query::{PaperPage, PaperQuery};

//=========================================================================================
// Projects and Roles
//=========================================================================================

/// Creates a project owned (as admin) by `owner_id`.
pub async fn create_project(
    db: &dyn DatabaseService,
    owner_id: Uuid,
    name: &str,
    research_question: &str,
    keywords: &[String],
) -> CoreResult<Project> {
    let name = non_empty(name, "project name")?;
    let research_question = non_empty(research_question, "research question")?;
    let keywords = normalize_keywords(keywords);

    let project = db
        .create_project(owner_id, name, research_question, &keywords)
        .await?;
    info!(project_id = %project.id, owner_id = %owner_id, "Project created");
    Ok(project)
}

pub async fn list_projects(
    db: &dyn DatabaseService,
    user_id: Uuid,
) -> CoreResult<Vec<(Project, Role)>> {
    Ok(db.list_projects_for_user(user_id).await?)
}

/// Grants `user_id` a role on the project. Only admins may change roles.
pub async fn set_member_role(
    db: &dyn DatabaseService,
    project_id: Uuid,
    actor_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> CoreResult<()> {
    require_admin(db, project_id, actor_id).await?;
    db.set_member_role(project_id, user_id, role).await?;
    info!(project_id = %project_id, user_id = %user_id, role = role.as_str(), "Member role set");
    Ok(())
}

/// Keywords trimmed, blanks dropped, duplicates removed (first spelling wins).
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(keywords.len());
    for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        if !out.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
            out.push(keyword.to_string());
        }
    }
    out
}

fn non_empty<'a>(value: &'a str, what: &str) -> CoreResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CoreError::Validation(format!("{} must not be empty", what)))
    } else {
        Ok(trimmed)
    }
}

//=========================================================================================
// Project Overview
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectOverview {
    pub project: Project,
    pub role: Role,
    pub papers: PaperPage,
}

/// Loads the project, the caller's role and the first page of papers concurrently.
pub async fn load_overview(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
) -> CoreResult<ProjectOverview> {
    let query = PaperQuery::default();
    let (project, role, papers) = futures::try_join!(
        db.get_project(project_id),
        db.get_member_role(project_id, user_id),
        db.fetch_papers(project_id, user_id, &query),
    )?;

    let role = role.ok_or_else(|| {
        CoreError::Forbidden(format!("user {} is not a member of project {}", user_id, project_id))
    })?;

    Ok(ProjectOverview {
        project,
        role,
        papers,
    })
}

//=========================================================================================
// Paper Import and Scoring
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub paper: ProjectPaper,
    /// `None` when scoring failed; the import itself still stands.
    pub score: Option<f64>,
}

/// Imports a paper into a project, then scores it.
///
/// A scoring failure leaves the paper imported and unscored; call
/// `rescore_paper` to retry.
pub async fn import_paper(
    db: &dyn DatabaseService,
    scorer: &dyn RelevancyScoringService,
    project_id: Uuid,
    user_id: Uuid,
    paper: &NewPaper,
) -> CoreResult<ImportOutcome> {
    let paper = validate_new_paper(paper)?;
    require_senior(db, project_id, user_id).await?;

    let project = db.get_project(project_id).await?;
    let mut entry = db.insert_paper(project_id, &paper).await?;
    info!(paper_id = %entry.paper.id, project_id = %project_id, "Paper imported");

    let score = match score_and_store(db, scorer, &project, &entry).await {
        Ok(score) => Some(score),
        Err(e) => {
            warn!(
                "Relevancy scoring failed for paper {} in project {}: {:?}",
                entry.paper.id, project_id, e
            );
            None
        }
    };
    entry.relevancy_score = score;

    Ok(ImportOutcome {
        paper: entry,
        score,
    })
}

/// Recomputes and stores a paper's relevancy score. Safe to repeat.
pub async fn rescore_paper(
    db: &dyn DatabaseService,
    scorer: &dyn RelevancyScoringService,
    project_id: Uuid,
    paper_id: Uuid,
    user_id: Uuid,
) -> CoreResult<f64> {
    require_senior(db, project_id, user_id).await?;
    let (project, entry) = futures::try_join!(
        db.get_project(project_id),
        db.get_project_paper(project_id, paper_id),
    )?;
    score_and_store(db, scorer, &project, &entry).await
}

async fn score_and_store(
    db: &dyn DatabaseService,
    scorer: &dyn RelevancyScoringService,
    project: &Project,
    entry: &ProjectPaper,
) -> CoreResult<f64> {
    let raw = scorer.score_paper(project, &entry.paper).await?;
    if !raw.is_finite() {
        return Err(CoreError::Validation(format!(
            "scoring function returned a non-finite score: {}",
            raw
        )));
    }
    let score = raw.clamp(0.0, 1.0);
    db.set_relevancy_score(project.id, entry.paper.id, score)
        .await?;
    info!(paper_id = %entry.paper.id, score, "Relevancy score stored");
    Ok(score)
}

fn validate_new_paper(paper: &NewPaper) -> CoreResult<NewPaper> {
    let title = non_empty(&paper.title, "paper title")?;
    let full_text_url = paper
        .full_text_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    Ok(NewPaper {
        title: title.to_string(),
        abstract_text: paper.abstract_text.trim().to_string(),
        authors: paper
            .authors
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        publication_date: paper.publication_date,
        full_text_url,
    })
}
