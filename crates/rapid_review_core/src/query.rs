//! crates/rapid_review_core/src/query.rs
//!
//! The paper query layer: filtered, sorted, paginated project papers with the
//! requesting reviewer's own decision overlaid on every row.
//!
//! The decision filter is part of the store query, so the reported total and
//! the page contents are computed over the same result set. `select_page` is
//! the reference implementation of those rules; SQL adapters mirror it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, error};
use uuid::Uuid;

use crate::access::require_member;
use crate::domain::{Decision, PaperView, ProjectPaper, Review};
use crate::error::{CoreError, CoreResult};
use crate::ports::DatabaseService;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

//=========================================================================================
// Query Parameters
//=========================================================================================

/// Which papers to keep, judged by the requesting reviewer's own decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionFilter {
    #[default]
    All,
    Unreviewed,
    Accept,
    Reject,
    Skip,
}

impl DecisionFilter {
    pub const ALL: [DecisionFilter; 5] = [
        DecisionFilter::All,
        DecisionFilter::Unreviewed,
        DecisionFilter::Accept,
        DecisionFilter::Reject,
        DecisionFilter::Skip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionFilter::All => "all",
            DecisionFilter::Unreviewed => "unreviewed",
            DecisionFilter::Accept => "accept",
            DecisionFilter::Reject => "reject",
            DecisionFilter::Skip => "skip",
        }
    }

    /// The decision a row must carry, or `None` for `All` and `Unreviewed`.
    pub fn decision(&self) -> Option<Decision> {
        match self {
            DecisionFilter::Accept => Some(Decision::Accept),
            DecisionFilter::Reject => Some(Decision::Reject),
            DecisionFilter::Skip => Some(Decision::Skip),
            DecisionFilter::All | DecisionFilter::Unreviewed => None,
        }
    }

    pub fn matches(&self, decision: Option<Decision>) -> bool {
        match self {
            DecisionFilter::All => true,
            DecisionFilter::Unreviewed => decision.is_none(),
            _ => decision == self.decision(),
        }
    }
}

impl FromStr for DecisionFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionFilter::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown decision filter '{}'", s)))
    }
}

impl fmt::Display for DecisionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    /// When the paper was imported into the project.
    #[default]
    CreatedAt,
    Title,
    RelevancyScore,
    PublicationDate,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        SortField::CreatedAt,
        SortField::Title,
        SortField::RelevancyScore,
        SortField::PublicationDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Title => "title",
            SortField::RelevancyScore => "relevancy_score",
            SortField::PublicationDate => "publication_date",
        }
    }
}

impl FromStr for SortField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown sort field '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(CoreError::Validation(format!(
                "unknown sort direction '{}'",
                other
            ))),
        }
    }
}

/// A request for one page of project papers. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaperQuery {
    pub filter: DecisionFilter,
    pub sort: SortField,
    pub direction: SortDirection,
    pub page: u32,
    pub per_page: u32,
}

impl Default for PaperQuery {
    fn default() -> Self {
        Self {
            filter: DecisionFilter::All,
            sort: SortField::CreatedAt,
            direction: SortDirection::Desc,
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaperQuery {
    /// The query used by the screening flow: one unreviewed paper, most relevant first.
    pub fn next_unreviewed() -> Self {
        Self {
            filter: DecisionFilter::Unreviewed,
            sort: SortField::RelevancyScore,
            direction: SortDirection::Desc,
            page: 1,
            per_page: 1,
        }
    }

    /// Clamps `page` to at least 1 and `per_page` to `1..=MAX_PAGE_SIZE`.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.per_page = self.per_page.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

//=========================================================================================
// Query Results
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PaperPage {
    pub papers: Vec<PaperView>,
    /// Number of papers matching the filter across all pages.
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl PaperPage {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}

//=========================================================================================
// In-Memory Join, Filter, Sort and Paginate
//=========================================================================================

/// Overlays the reviewer's decisions onto project papers, joined by paper id.
pub fn annotate(entries: Vec<ProjectPaper>, my_reviews: &[Review]) -> Vec<PaperView> {
    let decisions: HashMap<Uuid, Decision> = my_reviews
        .iter()
        .map(|r| (r.paper_id, r.decision))
        .collect();

    entries
        .into_iter()
        .map(|entry| {
            let my_decision = decisions.get(&entry.paper.id).copied();
            PaperView { entry, my_decision }
        })
        .collect()
}

/// Orders two rows by `sort`/`direction`. Missing values sort last whatever the
/// direction; ties fall back to the paper id so pages never overlap.
pub fn compare(a: &PaperView, b: &PaperView, sort: SortField, direction: SortDirection) -> Ordering {
    let primary = match sort {
        SortField::CreatedAt => direction.apply(a.entry.imported_at.cmp(&b.entry.imported_at)),
        SortField::Title => direction.apply(
            a.entry
                .paper
                .title
                .to_lowercase()
                .cmp(&b.entry.paper.title.to_lowercase()),
        ),
        SortField::RelevancyScore => compare_missing_last(
            a.entry.relevancy_score,
            b.entry.relevancy_score,
            direction,
            |x, y| x.total_cmp(y),
        ),
        SortField::PublicationDate => compare_missing_last(
            a.entry.paper.publication_date,
            b.entry.paper.publication_date,
            direction,
            |x, y| x.cmp(y),
        ),
    };
    primary.then_with(|| a.entry.paper.id.cmp(&b.entry.paper.id))
}

fn compare_missing_last<T>(
    a: Option<T>,
    b: Option<T>,
    direction: SortDirection,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => direction.apply(cmp(&x, &y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Joins, filters, counts, sorts and paginates in that order.
pub fn select_page(
    entries: Vec<ProjectPaper>,
    my_reviews: &[Review],
    query: &PaperQuery,
) -> PaperPage {
    let query = query.normalized();
    let mut rows: Vec<PaperView> = annotate(entries, my_reviews)
        .into_iter()
        .filter(|row| query.filter.matches(row.my_decision))
        .collect();
    let total = rows.len() as u64;

    rows.sort_by(|a, b| compare(a, b, query.sort, query.direction));
    let papers = rows
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.per_page as usize)
        .collect();

    PaperPage {
        papers,
        total,
        page: query.page,
        per_page: query.per_page,
    }
}

//=========================================================================================
// Query Operations
//=========================================================================================

/// Fetches one page of project papers with the caller's decisions overlaid.
pub async fn get_filtered_papers(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
    query: PaperQuery,
) -> CoreResult<PaperPage> {
    require_member(db, project_id, user_id).await?;
    let query = query.normalized();

    let page = db
        .fetch_papers(project_id, user_id, &query)
        .await
        .map_err(|e| {
            error!("Failed to load papers for project {}: {:?}", project_id, e);
            e
        })?;

    debug!(
        project_id = %project_id,
        filter = %query.filter,
        total = page.total,
        returned = page.papers.len(),
        "Loaded paper page"
    );
    Ok(page)
}
