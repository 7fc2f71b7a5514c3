//! services/api/src/lib.rs
//!
//! The RapidReview API service: configuration, the PostgreSQL and LLM
//! adapters, and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

pub use web::build_router;
