//! Integration tests for the REST API, run against the in-memory store.
//!
//! Language model adapters are built without a client, so criteria
//! generation and relevancy scoring fail the way they do when no API key
//! is configured.

use api_lib::{
    adapters::{OpenAiCriteriaAdapter, OpenAiRelevancyAdapter},
    build_router,
    config::Config,
    web::state::AppState,
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use rapid_review_core::export::EXPORT_HEADER;
use rapid_review_core::memory::InMemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt; // for `oneshot` method

//=========================================================================================
// Helpers
//=========================================================================================

fn setup_app() -> Router {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("memory://".to_string()),
        _ => None,
    })
    .unwrap();
    let state = Arc::new(AppState {
        db: Arc::new(InMemoryStore::new()),
        criteria_adapter: Arc::new(OpenAiCriteriaAdapter::new(None, config.criteria_model.clone())),
        relevancy_adapter: Arc::new(OpenAiRelevancyAdapter::new(None, config.scoring_model.clone())),
        config: Arc::new(config),
        shutdown: CancellationToken::new(),
    });
    build_router(state).unwrap()
}

fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Signs up a user and returns the `Cookie` header value for their session.
async fn signup(app: &Router, email: &str) -> String {
    let req = request(
        "POST",
        "/auth/signup",
        None,
        Some(json!({ "email": email, "password": "correct horse", "first_name": "Ada" })),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn create_project(app: &Router, cookie: &str) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/projects",
            Some(cookie),
            Some(json!({
                "name": "Sleep and memory",
                "research_question": "Does sleep deprivation impair memory consolidation?",
                "keywords": ["sleep", "memory"]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn import_paper(app: &Router, cookie: &str, project_id: &str, title: &str) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            &format!("/projects/{}/papers", project_id),
            Some(cookie),
            Some(json!({ "title": title, "abstract_text": "An abstract.", "authors": ["Doe, J."] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["paper"]["id"].as_str().unwrap().to_string()
}

//=========================================================================================
// Authentication
//=========================================================================================

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = setup_app();

    let (status, _) = send(&app, request("GET", "/projects", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request("GET", "/projects", Some("session=bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_login_and_me() {
    let app = setup_app();
    let cookie = signup(&app, "Ada@Example.org").await;

    let (status, me) = send(&app, request("GET", "/auth/me", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@example.org");
    assert_eq!(me["display_name"], "Ada");

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.org", "password": "wrong password" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.org", "password": "correct horse" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], me["user_id"]);
}

#[tokio::test]
async fn signup_rejects_bad_input_and_duplicates() {
    let app = setup_app();

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({ "email": "ada@example.org", "password": "short" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    signup(&app, "ada@example.org").await;
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({ "email": "ada@example.org", "password": "another password" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = setup_app();
    let cookie = signup(&app, "ada@example.org").await;

    let (status, _) = send(&app, request("POST", "/auth/logout", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, request("GET", "/auth/me", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

//=========================================================================================
// Projects, Papers and Screening
//=========================================================================================

#[tokio::test]
async fn screening_a_project_end_to_end() {
    let app = setup_app();
    let cookie = signup(&app, "ada@example.org").await;
    let project_id = create_project(&app, &cookie).await;

    let (status, projects) = send(&app, request("GET", "/projects", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(projects[0]["role"], "admin");

    // Scoring is unavailable, so the paper is imported unscored.
    let (status, imported) = send(
        &app,
        request(
            "POST",
            &format!("/projects/{}/papers", project_id),
            Some(&cookie),
            Some(json!({ "title": "Sleep spindles and recall" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(imported["score"], Value::Null);
    let paper_id = imported["paper"]["id"].as_str().unwrap().to_string();

    let (status, page) = send(
        &app,
        request(
            "GET",
            &format!("/projects/{}/papers?filter=unreviewed", project_id),
            Some(&cookie),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["papers"][0]["my_decision"], Value::Null);

    let (status, next) = send(
        &app,
        request("GET", &format!("/projects/{}/next", project_id), Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next["paper"]["id"], paper_id.as_str());
    assert_eq!(next["exhausted"], false);

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/projects/{}/reviews", project_id),
            Some(&cookie),
            Some(json!({ "paper_id": paper_id, "decision": "maybe" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, submitted) = send(
        &app,
        request(
            "POST",
            &format!("/projects/{}/reviews", project_id),
            Some(&cookie),
            Some(json!({ "paper_id": paper_id, "decision": "accept" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(submitted["review"]["decision"], "accept");
    assert_eq!(submitted["conflict"], Value::Null);
    assert_eq!(submitted["exhausted"], true);

    let (status, overview) = send(
        &app,
        request("GET", &format!("/projects/{}", project_id), Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["project"]["role"], "admin");
    assert_eq!(overview["papers"]["papers"][0]["my_decision"], "accept");
}

#[tokio::test]
async fn unknown_sort_field_is_a_bad_request() {
    let app = setup_app();
    let cookie = signup(&app, "ada@example.org").await;
    let project_id = create_project(&app, &cookie).await;

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/projects/{}/papers?sort=citations", project_id),
            Some(&cookie),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn outsiders_cannot_see_a_project() {
    let app = setup_app();
    let owner = signup(&app, "ada@example.org").await;
    let outsider = signup(&app, "bob@example.org").await;
    let project_id = create_project(&app, &owner).await;

    let (status, _) = send(
        &app,
        request("GET", &format!("/projects/{}", project_id), Some(&outsider), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request("GET", &format!("/projects/{}/export", project_id), Some(&outsider), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn disagreement_shows_up_in_the_conflict_queue() {
    let app = setup_app();
    let admin = signup(&app, "ada@example.org").await;
    let reviewer = signup(&app, "bob@example.org").await;
    let project_id = create_project(&app, &admin).await;
    let paper_id = import_paper(&app, &admin, &project_id, "Napping and recall").await;

    let (_, bob) = send(&app, request("GET", "/auth/me", Some(&reviewer), None)).await;
    let (status, _) = send(
        &app,
        request(
            "PUT",
            &format!("/projects/{}/members/{}", project_id, bob["user_id"].as_str().unwrap()),
            Some(&admin),
            Some(json!({ "role": "reviewer" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for (cookie, decision) in [(&admin, "accept"), (&reviewer, "reject")] {
        let (status, _) = send(
            &app,
            request(
                "POST",
                &format!("/projects/{}/reviews", project_id),
                Some(cookie.as_str()),
                Some(json!({ "paper_id": paper_id, "decision": decision })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, queue) = send(&app, request("GET", "/conflicts/next", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["conflict"]["paper"]["id"], paper_id.as_str());
    assert_eq!(queue["conflict"]["reviews"].as_array().unwrap().len(), 2);
    let conflict_id = queue["conflict"]["conflict"]["id"].as_str().unwrap().to_string();

    // Reviewers may not settle conflicts.
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/conflicts/{}/resolve", conflict_id),
            Some(&reviewer),
            Some(json!({ "decision": "accept" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, resolved) = send(
        &app,
        request(
            "POST",
            &format!("/conflicts/{}/resolve", conflict_id),
            Some(&admin),
            Some(json!({ "decision": "reject" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["resolved"]["resolution"], "reject");
    assert_eq!(resolved["next"], Value::Null);

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/conflicts/{}/resolve", conflict_id),
            Some(&admin),
            Some(json!({ "decision": "accept" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn export_is_served_as_csv() {
    let app = setup_app();
    let cookie = signup(&app, "ada@example.org").await;
    let project_id = create_project(&app, &cookie).await;
    import_paper(&app, &cookie, &project_id, "Sleep, memory and \"recall\"").await;

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/projects/{}/export", project_id),
            Some(&cookie),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains(".csv"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next().unwrap(), EXPORT_HEADER.join(","));
    assert!(lines.next().unwrap().contains("\"Sleep, memory and \"\"recall\"\"\""));
}

//=========================================================================================
// Criteria
//=========================================================================================

#[tokio::test]
async fn criteria_are_grouped_and_generation_reports_failure() {
    let app = setup_app();
    let cookie = signup(&app, "ada@example.org").await;
    let project_id = create_project(&app, &cookie).await;
    let criteria_uri = format!("/projects/{}/criteria", project_id);

    let (status, created) = send(
        &app,
        request(
            "POST",
            &criteria_uri,
            Some(&cookie),
            Some(json!({ "text": "Adults aged 18-65", "category": "Population", "is_inclusion": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let criterion_id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request(
            "POST",
            &criteria_uri,
            Some(&cookie),
            Some(json!({ "text": "Animal studies", "is_inclusion": false })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, groups) = send(&app, request("GET", &criteria_uri, Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups["inclusion"][0]["category"], "Population");
    assert_eq!(groups["exclusion"][0]["category"], "Uncategorized");

    let (status, _) = send(
        &app,
        request(
            "DELETE",
            &format!("{}/{}", criteria_uri, criterion_id),
            Some(&cookie),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // No API key is configured in tests.
    let (status, body) = send(
        &app,
        request("POST", &format!("{}/generate", criteria_uri), Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn outsiders_get_forbidden_for_any_criterion_id() {
    let app = setup_app();
    let owner = signup(&app, "ada@example.org").await;
    let outsider = signup(&app, "eve@example.org").await;
    let project_id = create_project(&app, &owner).await;
    let criteria_uri = format!("/projects/{}/criteria", project_id);

    let (status, created) = send(
        &app,
        request(
            "POST",
            &criteria_uri,
            Some(&owner),
            Some(json!({ "text": "Adults aged 18-65", "is_inclusion": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let existing = created["id"].as_str().unwrap().to_string();
    let missing = uuid::Uuid::new_v4().to_string();

    // Existing and unknown ids are indistinguishable to a non-member.
    for criterion_id in [&existing, &missing] {
        let uri = format!("{}/{}", criteria_uri, criterion_id);
        let (status, _) = send(&app, request("DELETE", &uri, Some(&outsider), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            request(
                "PUT",
                &uri,
                Some(&outsider),
                Some(json!({ "text": "Children", "is_inclusion": true })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    // A senior still sees 404 for ids outside the project.
    let (status, _) = send(
        &app,
        request("DELETE", &format!("{}/{}", criteria_uri, missing), Some(&owner), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
