//! crates/rapid_review_core/src/error.rs
//!
//! Error type for the screening, conflict and criteria flows.

use crate::ports::PortError;

/// Errors raised by the core flows.
///
/// Validation and permission failures are detected before the store is
/// touched; everything that went wrong inside a port arrives as `Port`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The caller supplied an invalid value (decision literal, empty text, ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The caller's project role does not allow the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An error that propagated up from one of the service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),
}

/// A convenience type alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;
