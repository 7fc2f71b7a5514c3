//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiCriteriaAdapter, OpenAiRelevancyAdapter},
    build_router,
    config::Config,
    error::ApiError,
    web::state::AppState,
};
use async_openai::{config::OpenAIConfig, Client};
use rapid_review_core::{memory::InMemoryStore, DatabaseService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Store & Run Migrations ---
    let db: Arc<dyn DatabaseService> = if config.uses_memory_store() {
        warn!("Using the in-memory store; all data is lost on restart.");
        Arc::new(InMemoryStore::new())
    } else {
        info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;
        let db_adapter = DbAdapter::new(db_pool);
        info!("Running database migrations...");
        db_adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Arc::new(db_adapter)
    };

    // --- 3. Initialize Language Model Adapters ---
    let openai_client = match config.openai_api_key.as_deref() {
        Some(key) => Some(Client::with_config(OpenAIConfig::new().with_api_key(key))),
        None => {
            warn!("OPENAI_API_KEY is not set; criteria generation and relevancy scoring are disabled.");
            None
        }
    };
    let criteria_adapter = Arc::new(OpenAiCriteriaAdapter::new(
        openai_client.clone(),
        config.criteria_model.clone(),
    ));
    let relevancy_adapter = Arc::new(OpenAiRelevancyAdapter::new(
        openai_client,
        config.scoring_model.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        db,
        config: config.clone(),
        criteria_adapter,
        relevancy_adapter,
        shutdown: shutdown.clone(),
    });

    // --- 5. Create the Web Router ---
    let app = build_router(app_state)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {:?}", e);
            }
            info!("Shutdown signal received; closing screening sessions.");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
