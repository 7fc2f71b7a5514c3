//! crates/rapid_review_core/src/memory.rs
//!
//! An in-memory implementation of `DatabaseService`.
//!
//! Used by the test-suite and by the API service when started with
//! `DATABASE_URL=memory://`. It follows the same rules as the PostgreSQL
//! adapter (conflict detection, review upserts, filtered pagination) and
//! counts calls per method so tests can assert that nothing reached the store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::conflicts::ConflictScope;
use crate::domain::{
    has_disagreement, Conflict, Criterion, CriterionDraft, Decision, ExportRow, NewPaper, Paper,
    Project, ProjectPaper, Review, ReviewerNote, Role, UserCredentials, UserProfile,
};
use crate::ports::{DatabaseService, PortError, PortResult};
use crate::query::{select_page, PaperPage, PaperQuery};

#[derive(Default)]
struct MemoryState {
    /// Logical clock; every write advances it by one second so ordering is stable.
    ticks: i64,
    users: HashMap<Uuid, UserProfile>,
    credentials: HashMap<String, UserCredentials>,
    auth_sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    projects: HashMap<Uuid, Project>,
    members: HashMap<(Uuid, Uuid), Role>,
    entries: HashMap<(Uuid, Uuid), ProjectPaper>,
    reviews: HashMap<Uuid, Review>,
    conflicts: HashMap<Uuid, Conflict>,
    criteria: HashMap<Uuid, Criterion>,
    notes: HashMap<(Uuid, Uuid, Uuid), ReviewerNote>,
}

impl MemoryState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        let epoch = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        epoch + Duration::seconds(self.ticks)
    }

    fn entry(&self, project_id: Uuid, paper_id: Uuid) -> PortResult<&ProjectPaper> {
        self.entries.get(&(project_id, paper_id)).ok_or_else(|| {
            PortError::NotFound(format!(
                "Paper {} not found in project {}",
                paper_id, project_id
            ))
        })
    }

    fn project_reviews(&self, project_id: Uuid, paper_id: Uuid) -> Vec<Review> {
        self.reviews
            .values()
            .filter(|r| r.project_id == project_id && r.paper_id == paper_id)
            .cloned()
            .collect()
    }
}

/// A `DatabaseService` backed by hash maps behind a `tokio::sync::RwLock`.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the named port method has been called.
    pub async fn call_count(&self, method: &str) -> usize {
        self.calls.lock().await.get(method).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }

    async fn count(&self, method: &'static str) {
        *self.calls.lock().await.entry(method).or_insert(0) += 1;
    }

    async fn read(&self, method: &'static str) -> RwLockReadGuard<'_, MemoryState> {
        self.count(method).await;
        self.state.read().await
    }

    async fn write(&self, method: &'static str) -> RwLockWriteGuard<'_, MemoryState> {
        self.count(method).await;
        self.state.write().await
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> PortResult<UserProfile> {
        let mut state = self.write("create_user_with_email").await;
        if state.credentials.contains_key(email) {
            return Err(PortError::Conflict(format!("User {} already exists", email)));
        }
        let profile = UserProfile {
            id: Uuid::new_v4(),
            username: email.to_string(),
            first_name: first_name.map(str::to_string),
            last_name: last_name.map(str::to_string),
            avatar_url: None,
        };
        state.credentials.insert(
            email.to_string(),
            UserCredentials {
                user_id: profile.id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        state.users.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let state = self.read("get_user_by_email").await;
        state
            .credentials
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn get_user_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let state = self.read("get_user_profile").await;
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut state = self.write("create_auth_session").await;
        state
            .auth_sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let state = self.read("validate_auth_session").await;
        match state.auth_sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut state = self.write("delete_auth_session").await;
        state.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn create_project(
        &self,
        owner_id: Uuid,
        name: &str,
        research_question: &str,
        keywords: &[String],
    ) -> PortResult<Project> {
        let mut state = self.write("create_project").await;
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            research_question: research_question.to_string(),
            keywords: keywords.to_vec(),
            created_at: state.tick(),
        };
        state.projects.insert(project.id, project.clone());
        state.members.insert((project.id, owner_id), Role::Admin);
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> PortResult<Project> {
        let state = self.read("get_project").await;
        state
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Project {} not found", project_id)))
    }

    async fn list_projects_for_user(&self, user_id: Uuid) -> PortResult<Vec<(Project, Role)>> {
        let state = self.read("list_projects_for_user").await;
        let mut projects: Vec<(Project, Role)> = state
            .members
            .iter()
            .filter(|((_, member), _)| *member == user_id)
            .filter_map(|((project_id, _), role)| {
                state.projects.get(project_id).map(|p| (p.clone(), *role))
            })
            .collect();
        projects.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
        Ok(projects)
    }

    async fn get_member_role(&self, project_id: Uuid, user_id: Uuid) -> PortResult<Option<Role>> {
        let state = self.read("get_member_role").await;
        Ok(state.members.get(&(project_id, user_id)).copied())
    }

    async fn set_member_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> PortResult<()> {
        let mut state = self.write("set_member_role").await;
        if !state.projects.contains_key(&project_id) {
            return Err(PortError::NotFound(format!("Project {} not found", project_id)));
        }
        state.members.insert((project_id, user_id), role);
        Ok(())
    }

    async fn fetch_papers(
        &self,
        project_id: Uuid,
        reviewer_id: Uuid,
        query: &PaperQuery,
    ) -> PortResult<PaperPage> {
        let state = self.read("fetch_papers").await;
        let entries: Vec<ProjectPaper> = state
            .entries
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        let my_reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|r| r.project_id == project_id && r.reviewer_id == reviewer_id)
            .cloned()
            .collect();
        Ok(select_page(entries, &my_reviews, query))
    }

    async fn get_project_paper(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
    ) -> PortResult<ProjectPaper> {
        let state = self.read("get_project_paper").await;
        state.entry(project_id, paper_id).cloned()
    }

    async fn insert_paper(&self, project_id: Uuid, paper: &NewPaper) -> PortResult<ProjectPaper> {
        let mut state = self.write("insert_paper").await;
        if !state.projects.contains_key(&project_id) {
            return Err(PortError::NotFound(format!("Project {} not found", project_id)));
        }
        let entry = ProjectPaper {
            project_id,
            paper: Paper {
                id: Uuid::new_v4(),
                title: paper.title.clone(),
                abstract_text: paper.abstract_text.clone(),
                authors: paper.authors.clone(),
                publication_date: paper.publication_date,
                full_text_url: paper.full_text_url.clone(),
            },
            relevancy_score: None,
            imported_at: state.tick(),
        };
        state
            .entries
            .insert((project_id, entry.paper.id), entry.clone());
        Ok(entry)
    }

    async fn set_relevancy_score(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        score: f64,
    ) -> PortResult<()> {
        let mut state = self.write("set_relevancy_score").await;
        let entry = state
            .entries
            .get_mut(&(project_id, paper_id))
            .ok_or_else(|| PortError::NotFound(format!("Paper {} not found", paper_id)))?;
        entry.relevancy_score = Some(score);
        Ok(())
    }

    async fn fetch_reviews(
        &self,
        project_id: Uuid,
        paper_id: Option<Uuid>,
        reviewer_id: Option<Uuid>,
    ) -> PortResult<Vec<Review>> {
        let state = self.read("fetch_reviews").await;
        let mut reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|r| r.project_id == project_id)
            .filter(|r| paper_id.map_or(true, |id| r.paper_id == id))
            .filter(|r| reviewer_id.map_or(true, |id| r.reviewer_id == id))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(reviews)
    }

    async fn upsert_review(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        reviewer_id: Uuid,
        decision: Decision,
    ) -> PortResult<Review> {
        let mut state = self.write("upsert_review").await;
        state.entry(project_id, paper_id)?;
        let now = state.tick();

        let existing = state
            .reviews
            .values_mut()
            .find(|r| {
                r.project_id == project_id && r.paper_id == paper_id && r.reviewer_id == reviewer_id
            });
        if let Some(review) = existing {
            review.decision = decision;
            review.created_at = now;
            return Ok(review.clone());
        }

        let review = Review {
            id: Uuid::new_v4(),
            project_id,
            paper_id,
            reviewer_id,
            decision,
            created_at: now,
        };
        state.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn check_for_conflict(&self, review_id: Uuid) -> PortResult<Option<Conflict>> {
        let mut state = self.write("check_for_conflict").await;
        let review = state
            .reviews
            .get(&review_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Review {} not found", review_id)))?;

        let open = state.conflicts.values().find(|c| {
            c.project_id == review.project_id && c.paper_id == review.paper_id && !c.is_resolved()
        });
        if let Some(conflict) = open {
            return Ok(Some(conflict.clone()));
        }

        let others = state.project_reviews(review.project_id, review.paper_id);
        if !has_disagreement(&review, &others) {
            return Ok(None);
        }

        let conflict = Conflict {
            id: Uuid::new_v4(),
            project_id: review.project_id,
            paper_id: review.paper_id,
            created_at: state.tick(),
            resolution: None,
            resolved_by: None,
            resolved_at: None,
        };
        state.conflicts.insert(conflict.id, conflict.clone());
        Ok(Some(conflict))
    }

    async fn oldest_unresolved_conflict(
        &self,
        user_id: Uuid,
        scope: ConflictScope,
    ) -> PortResult<Option<Conflict>> {
        let state = self.read("oldest_unresolved_conflict").await;
        Ok(state
            .conflicts
            .values()
            .filter(|c| !c.is_resolved() && scope.includes(c.project_id))
            .filter(|c| {
                matches!(
                    state.members.get(&(c.project_id, user_id)),
                    Some(Role::Senior | Role::Admin)
                )
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn get_conflict(&self, conflict_id: Uuid) -> PortResult<Conflict> {
        let state = self.read("get_conflict").await;
        state
            .conflicts
            .get(&conflict_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Conflict {} not found", conflict_id)))
    }

    async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Decision,
        resolver_id: Uuid,
    ) -> PortResult<Conflict> {
        let mut state = self.write("resolve_conflict").await;
        let now = state.tick();
        let conflict = state
            .conflicts
            .get_mut(&conflict_id)
            .ok_or_else(|| PortError::NotFound(format!("Conflict {} not found", conflict_id)))?;
        if conflict.is_resolved() {
            return Err(PortError::Conflict(format!(
                "Conflict {} is already resolved",
                conflict_id
            )));
        }
        conflict.resolution = Some(resolution);
        conflict.resolved_by = Some(resolver_id);
        conflict.resolved_at = Some(now);
        Ok(conflict.clone())
    }

    async fn list_criteria(&self, project_id: Uuid) -> PortResult<Vec<Criterion>> {
        let state = self.read("list_criteria").await;
        let mut criteria: Vec<Criterion> = state
            .criteria
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        criteria.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(criteria)
    }

    async fn get_criterion(&self, criterion_id: Uuid) -> PortResult<Criterion> {
        let state = self.read("get_criterion").await;
        state
            .criteria
            .get(&criterion_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Criterion {} not found", criterion_id)))
    }

    async fn create_criterion(
        &self,
        project_id: Uuid,
        draft: &CriterionDraft,
    ) -> PortResult<Criterion> {
        let mut state = self.write("create_criterion").await;
        if !state.projects.contains_key(&project_id) {
            return Err(PortError::NotFound(format!("Project {} not found", project_id)));
        }
        let criterion = Criterion {
            id: Uuid::new_v4(),
            project_id,
            text: draft.text.clone(),
            category: draft.category.clone(),
            is_inclusion: draft.is_inclusion,
            created_at: state.tick(),
        };
        state.criteria.insert(criterion.id, criterion.clone());
        Ok(criterion)
    }

    async fn update_criterion(
        &self,
        criterion_id: Uuid,
        draft: &CriterionDraft,
    ) -> PortResult<Criterion> {
        let mut state = self.write("update_criterion").await;
        let criterion = state
            .criteria
            .get_mut(&criterion_id)
            .ok_or_else(|| PortError::NotFound(format!("Criterion {} not found", criterion_id)))?;
        criterion.text = draft.text.clone();
        criterion.category = draft.category.clone();
        criterion.is_inclusion = draft.is_inclusion;
        Ok(criterion.clone())
    }

    async fn delete_criterion(&self, criterion_id: Uuid) -> PortResult<()> {
        let mut state = self.write("delete_criterion").await;
        state
            .criteria
            .remove(&criterion_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Criterion {} not found", criterion_id)))
    }

    async fn save_note(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        user_id: Uuid,
        body: &str,
    ) -> PortResult<ReviewerNote> {
        let mut state = self.write("save_note").await;
        state.entry(project_id, paper_id)?;
        let note = ReviewerNote {
            project_id,
            paper_id,
            user_id,
            body: body.to_string(),
            updated_at: state.tick(),
        };
        state
            .notes
            .insert((project_id, paper_id, user_id), note.clone());
        Ok(note)
    }

    async fn get_note(
        &self,
        project_id: Uuid,
        paper_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<ReviewerNote>> {
        let state = self.read("get_note").await;
        Ok(state.notes.get(&(project_id, paper_id, user_id)).cloned())
    }

    async fn fetch_export_rows(&self, project_id: Uuid) -> PortResult<Vec<ExportRow>> {
        let state = self.read("fetch_export_rows").await;
        let mut entries: Vec<&ProjectPaper> = state
            .entries
            .values()
            .filter(|e| e.project_id == project_id)
            .collect();
        entries.sort_by(|a, b| a.imported_at.cmp(&b.imported_at));

        Ok(entries
            .into_iter()
            .map(|entry| {
                let mut reviews = state.project_reviews(project_id, entry.paper.id);
                reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                let resolution = state
                    .conflicts
                    .values()
                    .filter(|c| c.project_id == project_id && c.paper_id == entry.paper.id)
                    .filter(|c| c.is_resolved())
                    .max_by(|a, b| a.resolved_at.cmp(&b.resolved_at))
                    .and_then(|c| c.resolution);
                ExportRow {
                    entry: entry.clone(),
                    reviews,
                    resolution,
                }
            })
            .collect())
    }
}
