//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use rapid_review_core::ConflictScopeMode;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// `DATABASE_URL` value that selects the in-memory store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub frontend_origin: String,
    pub openai_api_key: Option<String>,
    pub criteria_model: String,
    pub scoring_model: String,
    pub note_autosave: Duration,
    pub conflict_scope: ConflictScopeMode,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Load Server and Database Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", &var, 5u32)?;
        if database_max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "DATABASE_MAX_CONNECTIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let frontend_origin =
            var("FRONTEND_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Load API Keys (as optional) ---
        let openai_api_key = var("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());

        // --- Load Adapter-specific Settings ---
        let criteria_model = var("CRITERIA_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let scoring_model = var("SCORING_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        // --- Load Screening Settings ---
        let note_autosave = Duration::from_millis(parse_or("NOTE_AUTOSAVE_MS", &var, 800u64)?);

        let conflict_scope = match var("CONFLICT_SCOPE") {
            Some(value) => value.parse::<ConflictScopeMode>().map_err(|e| {
                ConfigError::InvalidValue("CONFLICT_SCOPE".to_string(), e.to_string())
            })?,
            None => ConflictScopeMode::default(),
        };

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            frontend_origin,
            openai_api_key,
            criteria_model,
            scoring_model,
            note_autosave,
            conflict_scope,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

fn parse_or<T>(
    key: &str,
    var: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
