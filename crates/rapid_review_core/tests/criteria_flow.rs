mod common;

use common::{draft, fixture, CannedGenerator};
use pretty_assertions::assert_eq;
use rapid_review_core::criteria::{
    create_criterion, delete_criterion, generate_criteria, list_criteria, update_criterion,
    UNCATEGORIZED,
};
use rapid_review_core::{CoreError, DatabaseService, PortError};

#[tokio::test]
async fn reviewers_cannot_change_criteria() {
    let fx = fixture().await;

    let result = create_criterion(
        &fx.store,
        fx.project.id,
        fx.reviewer,
        &draft("Adults only", Some("Population"), true),
    )
    .await;

    assert!(matches!(result, Err(CoreError::Forbidden(_))));
    assert_eq!(fx.store.call_count("create_criterion").await, 0);
}

#[tokio::test]
async fn empty_text_is_rejected_before_any_lookup() {
    let fx = fixture().await;
    let before = fx.store.total_calls().await;

    let result = create_criterion(&fx.store, fx.project.id, fx.senior, &draft("  ", None, true)).await;

    assert!(matches!(result, Err(CoreError::Validation(_))));
    assert_eq!(fx.store.total_calls().await, before);
}

#[tokio::test]
async fn created_criteria_are_grouped_for_every_member() {
    let fx = fixture().await;
    create_criterion(
        &fx.store,
        fx.project.id,
        fx.senior,
        &draft("Adults over 18", Some("Population"), true),
    )
    .await
    .unwrap();
    create_criterion(&fx.store, fx.project.id, fx.admin, &draft("Peer reviewed", None, true))
        .await
        .unwrap();
    create_criterion(
        &fx.store,
        fx.project.id,
        fx.senior,
        &draft("Animal studies", Some("Population"), false),
    )
    .await
    .unwrap();

    let groups = list_criteria(&fx.store, fx.project.id, fx.reviewer)
        .await
        .unwrap();

    let inclusion: Vec<&str> = groups.inclusion.iter().map(|g| g.category.as_str()).collect();
    assert_eq!(inclusion, vec!["Population", UNCATEGORIZED]);
    assert_eq!(groups.exclusion.len(), 1);
    assert_eq!(groups.exclusion[0].criteria[0].text, "Animal studies");
    assert_eq!(groups.len(), 3);
}

#[tokio::test]
async fn update_and_delete_follow_the_criterion_project() {
    let fx = fixture().await;
    let criterion = create_criterion(
        &fx.store,
        fx.project.id,
        fx.senior,
        &draft("English only", Some("Language"), true),
    )
    .await
    .unwrap();

    let denied = update_criterion(
        &fx.store,
        criterion.id,
        fx.reviewer,
        &draft("Any language", Some("Language"), true),
    )
    .await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));

    let updated = update_criterion(
        &fx.store,
        criterion.id,
        fx.senior,
        &draft("English or Spanish", Some("Language"), true),
    )
    .await
    .unwrap();
    assert_eq!(updated.id, criterion.id);
    assert_eq!(updated.text, "English or Spanish");

    delete_criterion(&fx.store, criterion.id, fx.admin)
        .await
        .unwrap();
    assert!(list_criteria(&fx.store, fx.project.id, fx.reviewer)
        .await
        .unwrap()
        .is_empty());

    let missing = delete_criterion(&fx.store, criterion.id, fx.admin).await;
    assert!(matches!(missing, Err(CoreError::Port(PortError::NotFound(_)))));
}

#[tokio::test]
async fn generated_criteria_are_stored_and_refetched() {
    let fx = fixture().await;
    create_criterion(
        &fx.store,
        fx.project.id,
        fx.senior,
        &draft("Adolescents 12-18", Some("Population"), true),
    )
    .await
    .unwrap();

    let generator = CannedGenerator {
        drafts: vec![
            draft("Objective sleep measure", Some("Outcome"), true),
            draft("", Some("Outcome"), true),
            draft("Case reports", Some("Study design"), false),
        ],
    };
    let groups = generate_criteria(&fx.store, &generator, fx.project.id, fx.senior)
        .await
        .unwrap();

    assert_eq!(groups.len(), 3);
    let inclusion: Vec<&str> = groups.inclusion.iter().map(|g| g.category.as_str()).collect();
    assert_eq!(inclusion, vec!["Outcome", "Population"]);
    assert_eq!(fx.store.list_criteria(fx.project.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn generation_requires_a_senior_role() {
    let fx = fixture().await;
    let generator = CannedGenerator {
        drafts: vec![draft("Anything", None, true)],
    };

    let result = generate_criteria(&fx.store, &generator, fx.project.id, fx.reviewer).await;

    assert!(matches!(result, Err(CoreError::Forbidden(_))));
    assert_eq!(fx.store.call_count("create_criterion").await, 0);
}
