mod common;

use common::{add_paper, fixture};
use pretty_assertions::assert_eq;
use rapid_review_core::query::get_filtered_papers;
use rapid_review_core::screening::list_paper_reviews;
use rapid_review_core::{
    CoreError, DatabaseService, Decision, DecisionFilter, PaperQuery, ScreeningFlow,
    ScreeningState, SortField,
};

#[tokio::test]
async fn unknown_decision_never_reaches_the_store() {
    let fx = fixture().await;
    let paper = add_paper(&fx.store, fx.project.id, "Blue light", Some(0.9)).await;
    let before = fx.store.total_calls().await;

    let flow = ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer);
    let result = flow.submit(paper.paper.id, "maybe").await;

    match result {
        Err(CoreError::Validation(message)) => {
            assert!(message.contains("accept"), "message was: {}", message);
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert_eq!(fx.store.total_calls().await, before);
}

#[tokio::test]
async fn presents_highest_relevancy_first_and_unscored_last() {
    let fx = fixture().await;
    add_paper(&fx.store, fx.project.id, "Unscored", None).await;
    let low = add_paper(&fx.store, fx.project.id, "Low", Some(0.2)).await;
    let high = add_paper(&fx.store, fx.project.id, "High", Some(0.8)).await;

    let flow = ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer);
    let ScreeningState::Presenting(first) = flow.next().await.unwrap() else {
        panic!("expected a paper");
    };
    assert_eq!(first.entry.paper.id, high.paper.id);
    assert_eq!(first.my_decision, None);

    let outcome = flow.submit(high.paper.id, "accept").await.unwrap();
    let ScreeningState::Presenting(second) = outcome.next else {
        panic!("expected a paper");
    };
    assert_eq!(second.entry.paper.id, low.paper.id);

    let outcome = flow.submit(low.paper.id, "skip").await.unwrap();
    let ScreeningState::Presenting(third) = outcome.next else {
        panic!("expected a paper");
    };
    assert_eq!(third.entry.paper.title, "Unscored");
}

#[tokio::test]
async fn reaches_exhausted_after_last_paper() {
    let fx = fixture().await;
    let only = add_paper(&fx.store, fx.project.id, "Only paper", Some(0.5)).await;

    let flow = ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer);
    let outcome = flow.submit(only.paper.id, "reject").await.unwrap();

    assert_eq!(outcome.review.decision, Decision::Reject);
    assert_eq!(outcome.conflict, None);
    assert_eq!(outcome.next, ScreeningState::Exhausted);
    assert!(flow.next().await.unwrap().is_exhausted());
}

#[tokio::test]
async fn unreviewed_filter_counts_only_papers_without_my_decision() {
    let fx = fixture().await;
    let a = add_paper(&fx.store, fx.project.id, "A", Some(0.1)).await;
    add_paper(&fx.store, fx.project.id, "B", Some(0.2)).await;
    add_paper(&fx.store, fx.project.id, "C", None).await;

    ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer)
        .submit(a.paper.id, "accept")
        .await
        .unwrap();

    let query = PaperQuery {
        filter: DecisionFilter::Unreviewed,
        ..PaperQuery::default()
    };
    let page = get_filtered_papers(&fx.store, fx.project.id, fx.reviewer, query)
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.papers.iter().all(|p| p.my_decision.is_none()));

    // Another reviewer still sees all three.
    let page = get_filtered_papers(&fx.store, fx.project.id, fx.second_reviewer, query)
        .await
        .unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn decision_filter_overlays_my_decision() {
    let fx = fixture().await;
    let a = add_paper(&fx.store, fx.project.id, "Alpha", Some(0.4)).await;
    let b = add_paper(&fx.store, fx.project.id, "beta", Some(0.6)).await;
    let flow = ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer);
    flow.submit(a.paper.id, "accept").await.unwrap();
    flow.submit(b.paper.id, "accept").await.unwrap();

    let query = PaperQuery {
        filter: DecisionFilter::Accept,
        sort: SortField::Title,
        direction: rapid_review_core::SortDirection::Asc,
        ..PaperQuery::default()
    };
    let page = get_filtered_papers(&fx.store, fx.project.id, fx.reviewer, query)
        .await
        .unwrap();

    let titles: Vec<&str> = page
        .papers
        .iter()
        .map(|p| p.entry.paper.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Alpha", "beta"]);
    assert!(page
        .papers
        .iter()
        .all(|p| p.my_decision == Some(Decision::Accept)));
}

#[tokio::test]
async fn resubmitting_replaces_the_previous_decision() {
    let fx = fixture().await;
    let paper = add_paper(&fx.store, fx.project.id, "Screens", Some(0.5)).await;
    let flow = ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer);

    let first = flow.submit(paper.paper.id, "accept").await.unwrap();
    let second = flow.submit(paper.paper.id, "skip").await.unwrap();

    assert_eq!(first.review.id, second.review.id);
    let reviews = list_paper_reviews(&fx.store, fx.project.id, paper.paper.id, fx.reviewer)
        .await
        .unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].decision, Decision::Skip);
}

#[tokio::test]
async fn opposing_decisions_open_a_conflict() {
    let fx = fixture().await;
    let paper = add_paper(&fx.store, fx.project.id, "Disputed", Some(0.7)).await;

    let first = ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer)
        .submit(paper.paper.id, "accept")
        .await
        .unwrap();
    assert_eq!(first.conflict, None);

    let second = ScreeningFlow::new(&fx.store, fx.project.id, fx.second_reviewer)
        .submit(paper.paper.id, "reject")
        .await
        .unwrap();
    let conflict = second.conflict.expect("conflict should be opened");
    assert_eq!(conflict.paper_id, paper.paper.id);
    assert!(!conflict.is_resolved());
}

#[tokio::test]
async fn skip_does_not_conflict() {
    let fx = fixture().await;
    let paper = add_paper(&fx.store, fx.project.id, "Skipped", Some(0.7)).await;

    ScreeningFlow::new(&fx.store, fx.project.id, fx.reviewer)
        .submit(paper.paper.id, "accept")
        .await
        .unwrap();
    let outcome = ScreeningFlow::new(&fx.store, fx.project.id, fx.second_reviewer)
        .submit(paper.paper.id, "skip")
        .await
        .unwrap();

    assert_eq!(outcome.conflict, None);
}

#[tokio::test]
async fn outsiders_cannot_screen() {
    let fx = fixture().await;
    let paper = add_paper(&fx.store, fx.project.id, "Private", None).await;
    let outsider = uuid::Uuid::new_v4();

    let result = ScreeningFlow::new(&fx.store, fx.project.id, outsider)
        .submit(paper.paper.id, "accept")
        .await;

    assert!(matches!(result, Err(CoreError::Forbidden(_))));
    assert_eq!(fx.store.call_count("upsert_review").await, 0);
    assert!(fx
        .store
        .fetch_reviews(fx.project.id, None, None)
        .await
        .unwrap()
        .is_empty());
}
