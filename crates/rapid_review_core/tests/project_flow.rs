mod common;

use common::{add_paper, fixture, new_paper, FixedScorer};
use pretty_assertions::assert_eq;
use rapid_review_core::export::{export_project_papers, EXPORT_HEADER};
use rapid_review_core::project::{
    create_project, import_paper, list_projects, load_overview, rescore_paper, set_member_role,
};
use rapid_review_core::{CoreError, DatabaseService, Role};
use uuid::Uuid;

#[tokio::test]
async fn creator_becomes_admin() {
    let fx = fixture().await;
    let owner = Uuid::new_v4();

    let project = create_project(
        &fx.store,
        owner,
        "  Exercise and mood  ",
        "Does exercise improve mood?",
        &["mood".to_string(), " ".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(project.name, "Exercise and mood");
    assert_eq!(project.keywords, vec!["mood".to_string()]);
    let projects = list_projects(&fx.store, owner).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].1, Role::Admin);
}

#[tokio::test]
async fn blank_project_name_is_rejected() {
    let fx = fixture().await;
    let result = create_project(&fx.store, fx.admin, " ", "Question?", &[]).await;
    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[tokio::test]
async fn only_admins_assign_roles() {
    let fx = fixture().await;
    let newcomer = Uuid::new_v4();

    let denied = set_member_role(&fx.store, fx.project.id, fx.senior, newcomer, Role::Reviewer).await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));

    set_member_role(&fx.store, fx.project.id, fx.admin, newcomer, Role::Senior)
        .await
        .unwrap();
    assert_eq!(
        fx.store
            .get_member_role(fx.project.id, newcomer)
            .await
            .unwrap(),
        Some(Role::Senior)
    );
}

#[tokio::test]
async fn import_stores_the_clamped_score() {
    let fx = fixture().await;

    let outcome = import_paper(
        &fx.store,
        &FixedScorer::new(1.7),
        fx.project.id,
        fx.senior,
        &new_paper("Night shifts"),
    )
    .await
    .unwrap();

    assert_eq!(outcome.score, Some(1.0));
    let stored = fx
        .store
        .get_project_paper(fx.project.id, outcome.paper.paper.id)
        .await
        .unwrap();
    assert_eq!(stored.relevancy_score, Some(1.0));
}

#[tokio::test]
async fn failed_scoring_keeps_the_import_and_can_be_retried() {
    let fx = fixture().await;

    let outcome = import_paper(
        &fx.store,
        &FixedScorer::failing(),
        fx.project.id,
        fx.admin,
        &new_paper("Unscored"),
    )
    .await
    .unwrap();
    assert_eq!(outcome.score, None);
    assert_eq!(outcome.paper.relevancy_score, None);

    let score = rescore_paper(
        &fx.store,
        &FixedScorer::new(0.35),
        fx.project.id,
        outcome.paper.paper.id,
        fx.admin,
    )
    .await
    .unwrap();
    assert_eq!(score, 0.35);
}

#[tokio::test]
async fn reviewers_cannot_import() {
    let fx = fixture().await;
    let result = import_paper(
        &fx.store,
        &FixedScorer::new(0.5),
        fx.project.id,
        fx.reviewer,
        &new_paper("Nope"),
    )
    .await;

    assert!(matches!(result, Err(CoreError::Forbidden(_))));
    assert_eq!(fx.store.call_count("insert_paper").await, 0);
}

#[tokio::test]
async fn overview_requires_membership() {
    let fx = fixture().await;
    add_paper(&fx.store, fx.project.id, "One", Some(0.1)).await;
    add_paper(&fx.store, fx.project.id, "Two", None).await;

    let overview = load_overview(&fx.store, fx.project.id, fx.reviewer)
        .await
        .unwrap();
    assert_eq!(overview.project.id, fx.project.id);
    assert_eq!(overview.role, Role::Reviewer);
    assert_eq!(overview.papers.total, 2);

    let outsider = load_overview(&fx.store, fx.project.id, Uuid::new_v4()).await;
    assert!(matches!(outsider, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn export_lists_every_paper_in_import_order() {
    let fx = fixture().await;
    add_paper(&fx.store, fx.project.id, "First", Some(0.25)).await;
    add_paper(&fx.store, fx.project.id, "Second", None).await;

    let csv = export_project_papers(&fx.store, fx.project.id, fx.reviewer)
        .await
        .unwrap();
    let csv = String::from_utf8(csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], EXPORT_HEADER.join(","));
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(",First,"));
    assert!(lines[1].contains(",0.2500,0,0,0,"));
    assert!(lines[2].contains(",Second,"));
    assert!(lines[2].ends_with(",,0,0,0,"));

    let outsider = export_project_papers(&fx.store, fx.project.id, Uuid::new_v4()).await;
    assert!(matches!(outsider, Err(CoreError::Forbidden(_))));
}
