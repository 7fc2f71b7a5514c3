//! crates/rapid_review_core/src/conflicts.rs
//!
//! The conflict resolution queue. Conflicts are opened by the store when two
//! reviewers disagree; a senior reviewer works through them oldest first.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{require_member, require_senior};
use crate::domain::{Conflict, Decision, ProjectPaper, Review};
use crate::error::{CoreError, CoreResult};
use crate::ports::{DatabaseService, PortError};

/// Which conflicts the queue draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictScope {
    /// Every project where the caller can resolve conflicts (senior or admin), oldest first.
    #[default]
    Global,
    /// A single project.
    Project(Uuid),
}

impl ConflictScope {
    pub fn includes(&self, project_id: Uuid) -> bool {
        match self {
            ConflictScope::Global => true,
            ConflictScope::Project(id) => *id == project_id,
        }
    }
}

impl fmt::Display for ConflictScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictScope::Global => f.write_str("global"),
            ConflictScope::Project(id) => write!(f, "project:{}", id),
        }
    }
}

/// The scope setting as configured, before a project id is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictScopeMode {
    #[default]
    Global,
    Project,
}

impl ConflictScopeMode {
    /// The scope for a request. An explicit project always narrows the queue;
    /// without one, project mode has nothing to narrow to.
    pub fn resolve(&self, project_id: Option<Uuid>) -> CoreResult<ConflictScope> {
        match (self, project_id) {
            (_, Some(id)) => Ok(ConflictScope::Project(id)),
            (ConflictScopeMode::Global, None) => Ok(ConflictScope::Global),
            (ConflictScopeMode::Project, None) => Err(CoreError::Validation(
                "project_id is required when conflicts are scoped per project".to_string(),
            )),
        }
    }
}

impl FromStr for ConflictScopeMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(ConflictScopeMode::Global),
            "project" => Ok(ConflictScopeMode::Project),
            other => Err(CoreError::Validation(format!(
                "unknown conflict scope '{}'",
                other
            ))),
        }
    }
}

/// A conflict with everything a resolver needs to see.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDetails {
    pub conflict: Conflict,
    /// The paper with its per-project relevancy score.
    pub paper: ProjectPaper,
    /// Every reviewer's decision on the paper, oldest first.
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictQueueState {
    Pending(ConflictDetails),
    /// No unresolved conflicts remain in scope.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOutcome {
    pub resolved: Conflict,
    pub next: ConflictQueueState,
}

/// Loads the oldest unresolved conflict in scope, with its paper and reviews.
pub async fn next_conflict(
    db: &dyn DatabaseService,
    user_id: Uuid,
    scope: ConflictScope,
) -> CoreResult<ConflictQueueState> {
    if let ConflictScope::Project(project_id) = scope {
        require_member(db, project_id, user_id).await?;
    }

    let Some(conflict) = db.oldest_unresolved_conflict(user_id, scope).await? else {
        return Ok(ConflictQueueState::Empty);
    };

    let (paper, mut reviews) = futures::try_join!(
        db.get_project_paper(conflict.project_id, conflict.paper_id),
        db.fetch_reviews(conflict.project_id, Some(conflict.paper_id), None),
    )?;
    reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(ConflictQueueState::Pending(ConflictDetails {
        conflict,
        paper,
        reviews,
    }))
}

/// Applies a resolver's decision to a conflict, then loads the next one in scope.
pub async fn resolve_conflict(
    db: &dyn DatabaseService,
    conflict_id: Uuid,
    decision: &str,
    resolver_id: Uuid,
    scope: ConflictScope,
) -> CoreResult<ResolveOutcome> {
    let decision: Decision = decision.parse()?;

    let conflict = db.get_conflict(conflict_id).await?;
    require_senior(db, conflict.project_id, resolver_id).await?;
    if conflict.is_resolved() {
        warn!(conflict_id = %conflict_id, "Conflict already resolved");
        return Err(PortError::Conflict(format!("conflict {} is already resolved", conflict_id)).into());
    }

    let resolved = db.resolve_conflict(conflict_id, decision, resolver_id).await?;
    info!(
        conflict_id = %conflict_id,
        resolution = %decision,
        resolver_id = %resolver_id,
        "Conflict resolved"
    );

    let next = next_conflict(db, resolver_id, scope).await?;
    Ok(ResolveOutcome { resolved, next })
}
