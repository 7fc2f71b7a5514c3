pub mod auth;
pub mod criteria;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

pub use middleware::require_auth;
pub use ws_handler::ws_handler;

use crate::config::ConfigError;
use crate::error::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Request bodies are JSON documents; paper abstracts are the largest.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Builds the full application: public auth routes, the protected REST and
/// WebSocket routes, CORS for the frontend, and the Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .frontend_origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("FRONTEND_ORIGIN".to_string(), e.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/projects",
            get(rest::list_projects_handler).post(rest::create_project_handler),
        )
        .route("/projects/{project_id}", get(rest::project_overview_handler))
        .route(
            "/projects/{project_id}/members/{user_id}",
            put(rest::set_member_role_handler),
        )
        .route(
            "/projects/{project_id}/papers",
            get(rest::list_papers_handler).post(rest::import_paper_handler),
        )
        .route(
            "/projects/{project_id}/papers/{paper_id}/score",
            post(rest::score_paper_handler),
        )
        .route(
            "/projects/{project_id}/papers/{paper_id}/reviews",
            get(rest::list_reviews_handler),
        )
        .route(
            "/projects/{project_id}/papers/{paper_id}/note",
            get(rest::get_note_handler),
        )
        .route("/projects/{project_id}/next", get(rest::next_paper_handler))
        .route(
            "/projects/{project_id}/reviews",
            post(rest::submit_review_handler),
        )
        .route("/projects/{project_id}/export", get(rest::export_handler))
        .route(
            "/projects/{project_id}/criteria",
            get(criteria::list_criteria_handler).post(criteria::create_criterion_handler),
        )
        .route(
            "/projects/{project_id}/criteria/generate",
            post(criteria::generate_criteria_handler),
        )
        .route(
            "/projects/{project_id}/criteria/{criterion_id}",
            put(criteria::update_criterion_handler).delete(criteria::delete_criterion_handler),
        )
        .route("/conflicts/next", get(rest::next_conflict_handler))
        .route(
            "/conflicts/{conflict_id}/resolve",
            post(rest::resolve_conflict_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(app_state);

    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", rest::ApiDoc::openapi())))
}
