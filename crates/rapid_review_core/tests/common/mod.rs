//! Shared fixtures for the flow tests.
#![allow(dead_code)]

use async_trait::async_trait;
use rapid_review_core::memory::InMemoryStore;
use rapid_review_core::{
    Criterion, CriterionDraft, DatabaseService, NewPaper, Paper, PortError, PortResult, Project,
    ProjectPaper, RelevancyScoringService, Role,
};
use rapid_review_core::CriteriaGenerationService;
use uuid::Uuid;

pub struct Fixture {
    pub store: InMemoryStore,
    pub project: Project,
    pub admin: Uuid,
    pub reviewer: Uuid,
    pub second_reviewer: Uuid,
    pub senior: Uuid,
}

/// A project with an admin, a senior reviewer and two reviewers.
pub async fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let admin = Uuid::new_v4();
    let project = store
        .create_project(
            admin,
            "Screen time and sleep",
            "Does evening screen use shorten adolescent sleep?",
            &["sleep".to_string(), "adolescents".to_string()],
        )
        .await
        .unwrap();

    let reviewer = Uuid::new_v4();
    let second_reviewer = Uuid::new_v4();
    let senior = Uuid::new_v4();
    store
        .set_member_role(project.id, reviewer, Role::Reviewer)
        .await
        .unwrap();
    store
        .set_member_role(project.id, second_reviewer, Role::Reviewer)
        .await
        .unwrap();
    store
        .set_member_role(project.id, senior, Role::Senior)
        .await
        .unwrap();

    Fixture {
        store,
        project,
        admin,
        reviewer,
        second_reviewer,
        senior,
    }
}

pub fn new_paper(title: &str) -> NewPaper {
    NewPaper {
        title: title.to_string(),
        abstract_text: format!("Abstract of {}", title),
        authors: vec!["Doe, J.".to_string()],
        publication_date: None,
        full_text_url: None,
    }
}

pub async fn add_paper(
    store: &InMemoryStore,
    project_id: Uuid,
    title: &str,
    score: Option<f64>,
) -> ProjectPaper {
    let mut entry = store
        .insert_paper(project_id, &new_paper(title))
        .await
        .unwrap();
    if let Some(score) = score {
        store
            .set_relevancy_score(project_id, entry.paper.id, score)
            .await
            .unwrap();
        entry.relevancy_score = Some(score);
    }
    entry
}

/// Scores every paper with the same value, or fails when built with `failing()`.
pub struct FixedScorer {
    score: Option<f64>,
}

impl FixedScorer {
    pub fn new(score: f64) -> Self {
        Self { score: Some(score) }
    }

    pub fn failing() -> Self {
        Self { score: None }
    }
}

#[async_trait]
impl RelevancyScoringService for FixedScorer {
    async fn score_paper(&self, _project: &Project, _paper: &Paper) -> PortResult<f64> {
        self.score
            .ok_or_else(|| PortError::Unexpected("scoring function unavailable".to_string()))
    }
}

/// Returns a fixed list of drafts.
pub struct CannedGenerator {
    pub drafts: Vec<CriterionDraft>,
}

#[async_trait]
impl CriteriaGenerationService for CannedGenerator {
    async fn generate_criteria(
        &self,
        _project: &Project,
        _existing: &[Criterion],
    ) -> PortResult<Vec<CriterionDraft>> {
        Ok(self.drafts.clone())
    }
}

pub fn draft(text: &str, category: Option<&str>, is_inclusion: bool) -> CriterionDraft {
    CriterionDraft {
        text: text.to_string(),
        category: category.map(str::to_string),
        is_inclusion,
    }
}
