//! crates/rapid_review_core/src/screening.rs
//!
//! The abstract screening loop: present the next unreviewed paper, record the
//! reviewer's decision, ask the store to check for a conflict, and move on
//! until nothing is left to review.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::require_member;
use crate::domain::{Conflict, Decision, PaperView, Review};
use crate::error::CoreResult;
use crate::ports::DatabaseService;
use crate::query::PaperQuery;

/// Where a reviewer stands in the screening loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreeningState {
    /// A paper is waiting for the reviewer's decision.
    Presenting(PaperView),
    /// Every paper in the project carries a decision from this reviewer.
    Exhausted,
}

impl ScreeningState {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ScreeningState::Exhausted)
    }
}

/// What a successful submission produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub review: Review,
    /// The conflict the store opened (or already had open) for this paper.
    pub conflict: Option<Conflict>,
    pub next: ScreeningState,
}

/// Drives one reviewer through one project's screening queue.
pub struct ScreeningFlow<'a> {
    db: &'a dyn DatabaseService,
    project_id: Uuid,
    reviewer_id: Uuid,
}

impl<'a> ScreeningFlow<'a> {
    pub fn new(db: &'a dyn DatabaseService, project_id: Uuid, reviewer_id: Uuid) -> Self {
        Self {
            db,
            project_id,
            reviewer_id,
        }
    }

    /// Fetches the paper the reviewer should look at next.
    pub async fn next(&self) -> CoreResult<ScreeningState> {
        require_member(self.db, self.project_id, self.reviewer_id).await?;
        self.fetch_next().await
    }

    /// Validates the decision literal, then records it.
    ///
    /// An unknown literal is rejected before the store is contacted.
    pub async fn submit(&self, paper_id: Uuid, decision: &str) -> CoreResult<SubmitOutcome> {
        let decision: Decision = decision.parse()?;
        self.submit_decision(paper_id, decision).await
    }

    pub async fn submit_decision(
        &self,
        paper_id: Uuid,
        decision: Decision,
    ) -> CoreResult<SubmitOutcome> {
        require_member(self.db, self.project_id, self.reviewer_id).await?;

        let review = self
            .db
            .upsert_review(self.project_id, paper_id, self.reviewer_id, decision)
            .await?;
        info!(
            review_id = %review.id,
            paper_id = %paper_id,
            decision = %decision,
            "Review recorded"
        );

        // A failed check must not undo the review the reviewer just made.
        let conflict = match self.db.check_for_conflict(review.id).await {
            Ok(Some(conflict)) => {
                info!(conflict_id = %conflict.id, paper_id = %paper_id, "Conflict detected");
                Some(conflict)
            }
            Ok(None) => {
                debug!(review_id = %review.id, "No conflict for review");
                None
            }
            Err(e) => {
                warn!("Conflict check failed for review {}: {:?}", review.id, e);
                None
            }
        };

        let next = self.fetch_next().await?;
        if next.is_exhausted() {
            info!(project_id = %self.project_id, "No more papers to screen");
        }

        Ok(SubmitOutcome {
            review,
            conflict,
            next,
        })
    }

    async fn fetch_next(&self) -> CoreResult<ScreeningState> {
        let page = self
            .db
            .fetch_papers(self.project_id, self.reviewer_id, &PaperQuery::next_unreviewed())
            .await?;

        Ok(match page.papers.into_iter().next() {
            Some(paper) => ScreeningState::Presenting(paper),
            None => ScreeningState::Exhausted,
        })
    }
}

/// Every reviewer's decision on one paper, oldest first.
pub async fn list_paper_reviews(
    db: &dyn DatabaseService,
    project_id: Uuid,
    paper_id: Uuid,
    user_id: Uuid,
) -> CoreResult<Vec<Review>> {
    require_member(db, project_id, user_id).await?;
    let mut reviews = db.fetch_reviews(project_id, Some(paper_id), None).await?;
    reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(reviews)
}
