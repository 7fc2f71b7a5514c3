//! crates/rapid_review_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

//=========================================================================================
// Projects and Membership
//=========================================================================================

/// A systematic-review effort containing papers, criteria and reviewer roles.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub research_question: String,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A user's role within a single project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Senior,
    Reviewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Senior => "senior",
            Role::Reviewer => "reviewer",
        }
    }

    /// Senior reviewers and admins curate criteria and settle conflicts.
    pub fn is_senior(&self) -> bool {
        matches!(self, Role::Admin | Role::Senior)
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "senior" => Ok(Role::Senior),
            "reviewer" => Ok(Role::Reviewer),
            other => Err(CoreError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

//=========================================================================================
// Papers
//=========================================================================================

/// A bibliographic record, independent of any project.
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    pub id: Uuid,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub publication_date: Option<NaiveDate>,
    pub full_text_url: Option<String>,
}

/// The fields needed to import a paper into a project.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaper {
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub publication_date: Option<NaiveDate>,
    pub full_text_url: Option<String>,
}

/// A paper as it belongs to one project: the join record plus the paper itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPaper {
    pub project_id: Uuid,
    pub paper: Paper,
    pub relevancy_score: Option<f64>,
    pub imported_at: DateTime<Utc>,
}

/// A project paper annotated with the requesting reviewer's own decision.
/// `my_decision` is `None` while the paper is unreviewed.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperView {
    pub entry: ProjectPaper,
    pub my_decision: Option<Decision>,
}

//=========================================================================================
// Reviews and Conflicts
//=========================================================================================

/// A reviewer's verdict on a paper at the abstract screening stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Decision {
    Accept,
    Reject,
    Skip,
}

impl Decision {
    pub const ALL: [Decision; 3] = [Decision::Accept, Decision::Reject, Decision::Skip];

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
            Decision::Skip => "skip",
        }
    }

    /// Two decisions disagree only when one includes and the other excludes.
    /// A skip defers judgement and never opens a conflict.
    pub fn conflicts_with(&self, other: Decision) -> bool {
        matches!(
            (self, other),
            (Decision::Accept, Decision::Reject) | (Decision::Reject, Decision::Accept)
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Decision::Accept),
            "reject" => Ok(Decision::Reject),
            "skip" => Ok(Decision::Skip),
            other => Err(CoreError::Validation(format!(
                "invalid decision '{}': expected one of accept, reject, skip",
                other
            ))),
        }
    }
}

/// One reviewer's decision on one paper within one project.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub project_id: Uuid,
    pub paper_id: Uuid,
    pub reviewer_id: Uuid,
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
}

/// A disagreement between reviewers on the same paper, awaiting a resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub id: Uuid,
    pub project_id: Uuid,
    pub paper_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<Decision>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Returns true when `candidate` disagrees with any earlier decision on the same paper.
pub fn has_disagreement(candidate: &Review, others: &[Review]) -> bool {
    others.iter().any(|r| {
        r.id != candidate.id
            && r.reviewer_id != candidate.reviewer_id
            && r.project_id == candidate.project_id
            && r.paper_id == candidate.paper_id
            && r.decision.conflicts_with(candidate.decision)
    })
}

//=========================================================================================
// Criteria
//=========================================================================================

/// A single inclusion or exclusion rule used during screening.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub id: Uuid,
    pub project_id: Uuid,
    pub text: String,
    pub category: Option<String>,
    pub is_inclusion: bool,
    pub created_at: DateTime<Utc>,
}

/// The editable part of a criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionDraft {
    pub text: String,
    pub category: Option<String>,
    pub is_inclusion: bool,
}

//=========================================================================================
// Users and Notes
//=========================================================================================

/// A user's public profile. `username` is the login email.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Full name when known, otherwise the username.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// Free-text notes a reviewer keeps while screening a paper.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewerNote {
    pub project_id: Uuid,
    pub paper_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

/// One row of the project export: a paper with its score and tallied decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub entry: ProjectPaper,
    pub reviews: Vec<Review>,
    pub resolution: Option<Decision>,
}
