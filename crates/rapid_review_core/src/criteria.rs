//! crates/rapid_review_core/src/criteria.rs
//!
//! Inclusion/exclusion criteria for a project, grouped by category, with
//! create/update/delete and AI-assisted generation. Only senior reviewers and
//! admins may change a project's criteria.

use std::collections::BTreeMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{require_member, require_senior};
use crate::domain::{Criterion, CriterionDraft};
use crate::error::{CoreError, CoreResult};
use crate::ports::{CriteriaGenerationService, DatabaseService};

/// Group label for criteria without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub category: String,
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CriteriaGroups {
    pub inclusion: Vec<CategoryGroup>,
    pub exclusion: Vec<CategoryGroup>,
}

impl CriteriaGroups {
    pub fn len(&self) -> usize {
        self.inclusion
            .iter()
            .chain(self.exclusion.iter())
            .map(|g| g.criteria.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits criteria into inclusion and exclusion, then groups each side by category.
///
/// Named categories come first in alphabetical order; `Uncategorized` is last.
/// Criteria keep their input order within a group.
pub fn group_criteria(criteria: Vec<Criterion>) -> CriteriaGroups {
    let (inclusion, exclusion): (Vec<_>, Vec<_>) =
        criteria.into_iter().partition(|c| c.is_inclusion);

    CriteriaGroups {
        inclusion: group_by_category(inclusion),
        exclusion: group_by_category(exclusion),
    }
}

fn group_by_category(criteria: Vec<Criterion>) -> Vec<CategoryGroup> {
    let mut named: BTreeMap<String, Vec<Criterion>> = BTreeMap::new();
    let mut uncategorized = Vec::new();

    for criterion in criteria {
        match normalize_category(criterion.category.as_deref()) {
            Some(category) => named.entry(category).or_default().push(criterion),
            None => uncategorized.push(criterion),
        }
    }

    let mut groups: Vec<CategoryGroup> = named
        .into_iter()
        .map(|(category, criteria)| CategoryGroup { category, criteria })
        .collect();
    if !uncategorized.is_empty() {
        groups.push(CategoryGroup {
            category: UNCATEGORIZED.to_string(),
            criteria: uncategorized,
        });
    }
    groups
}

fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Trims the draft and rejects empty text.
pub fn validate_draft(draft: &CriterionDraft) -> CoreResult<CriterionDraft> {
    let text = draft.text.trim();
    if text.is_empty() {
        return Err(CoreError::Validation(
            "criterion text must not be empty".to_string(),
        ));
    }
    Ok(CriterionDraft {
        text: text.to_string(),
        category: normalize_category(draft.category.as_deref()),
        is_inclusion: draft.is_inclusion,
    })
}

//=========================================================================================
// Criteria Operations
//=========================================================================================

pub async fn list_criteria(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
) -> CoreResult<CriteriaGroups> {
    require_member(db, project_id, user_id).await?;
    let criteria = db.list_criteria(project_id).await?;
    Ok(group_criteria(criteria))
}

pub async fn create_criterion(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
    draft: &CriterionDraft,
) -> CoreResult<Criterion> {
    let draft = validate_draft(draft)?;
    require_senior(db, project_id, user_id).await?;

    let criterion = db.create_criterion(project_id, &draft).await?;
    info!(criterion_id = %criterion.id, project_id = %project_id, "Criterion created");
    Ok(criterion)
}

pub async fn update_criterion(
    db: &dyn DatabaseService,
    criterion_id: Uuid,
    user_id: Uuid,
    draft: &CriterionDraft,
) -> CoreResult<Criterion> {
    let draft = validate_draft(draft)?;
    let existing = db.get_criterion(criterion_id).await?;
    require_senior(db, existing.project_id, user_id).await?;

    let criterion = db.update_criterion(criterion_id, &draft).await?;
    info!(criterion_id = %criterion_id, "Criterion updated");
    Ok(criterion)
}

pub async fn delete_criterion(
    db: &dyn DatabaseService,
    criterion_id: Uuid,
    user_id: Uuid,
) -> CoreResult<()> {
    let existing = db.get_criterion(criterion_id).await?;
    require_senior(db, existing.project_id, user_id).await?;

    db.delete_criterion(criterion_id).await?;
    info!(criterion_id = %criterion_id, "Criterion deleted");
    Ok(())
}

/// Asks the generation function for new criteria, stores them, and returns the refreshed list.
///
/// Drafts the generator returns with empty text are dropped.
pub async fn generate_criteria(
    db: &dyn DatabaseService,
    generator: &dyn CriteriaGenerationService,
    project_id: Uuid,
    user_id: Uuid,
) -> CoreResult<CriteriaGroups> {
    require_senior(db, project_id, user_id).await?;

    let (project, existing) =
        futures::try_join!(db.get_project(project_id), db.list_criteria(project_id))?;
    let drafts = generator.generate_criteria(&project, &existing).await?;

    let mut created = 0usize;
    for draft in &drafts {
        match validate_draft(draft) {
            Ok(draft) => {
                db.create_criterion(project_id, &draft).await?;
                created += 1;
            }
            Err(e) => warn!("Dropping generated criterion: {}", e),
        }
    }
    info!(project_id = %project_id, created, "Generated criteria stored");

    let criteria = db.list_criteria(project_id).await?;
    Ok(group_criteria(criteria))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn criterion(text: &str, category: Option<&str>, is_inclusion: bool) -> Criterion {
        Criterion {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            text: text.to_string(),
            category: category.map(str::to_string),
            is_inclusion,
            created_at: Utc::now(),
        }
    }

    fn summary(groups: &[CategoryGroup]) -> Vec<(String, usize)> {
        groups
            .iter()
            .map(|g| (g.category.clone(), g.criteria.len()))
            .collect()
    }

    #[test]
    fn missing_category_groups_as_uncategorized() {
        let groups = group_criteria(vec![
            criterion("Adults over 18", Some("Population"), true),
            criterion("Peer reviewed", None, true),
        ]);

        assert_eq!(
            summary(&groups.inclusion),
            vec![("Population".to_string(), 1), (UNCATEGORIZED.to_string(), 1)]
        );
        assert!(groups.exclusion.is_empty());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn splits_sides_and_orders_categories() {
        let groups = group_criteria(vec![
            criterion("No animal studies", Some("Population"), false),
            criterion("RCT", Some("Study design"), true),
            criterion("Blank category", Some("   "), false),
            criterion("Adults", Some("Population"), true),
            criterion("Children", Some(" Population "), true),
        ]);

        assert_eq!(
            summary(&groups.inclusion),
            vec![("Population".to_string(), 2), ("Study design".to_string(), 1)]
        );
        assert_eq!(
            summary(&groups.exclusion),
            vec![("Population".to_string(), 1), (UNCATEGORIZED.to_string(), 1)]
        );
        let population = &groups.inclusion[0].criteria;
        assert_eq!(population[0].text, "Adults");
        assert_eq!(population[1].text, "Children");
    }

    #[test]
    fn drafts_are_trimmed_and_validated() {
        let draft = validate_draft(&CriterionDraft {
            text: "  English language  ".to_string(),
            category: Some(" ".to_string()),
            is_inclusion: true,
        })
        .unwrap();
        assert_eq!(draft.text, "English language");
        assert_eq!(draft.category, None);

        let empty = validate_draft(&CriterionDraft {
            text: "\n\t".to_string(),
            category: None,
            is_inclusion: false,
        });
        assert!(matches!(empty, Err(CoreError::Validation(_))));
    }
}
