use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ErrorContext;

/// Coarse error taxonomy shared by every crate in the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Operator mistake; never retried automatically
    Validation,
    /// Resource state incompatible with the request; re-fetch and retry
    State,
    /// Persistence or transport failure; retried with an idempotency key
    Infrastructure,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::State => "state",
            ErrorCategory::Infrastructure => "infrastructure",
        };
        f.write_str(label)
    }
}

/// Simplified error enum for common use cases
#[derive(Error, Debug)]
pub enum RustCareError {
    /// Validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),
    
    /// Business rule or state-machine errors
    #[error("Business logic error: {0}")]
    BusinessError(String),
    
    /// Lost an optimistic concurrency race
    #[error("Conflict: {0}")]
    ConflictError(String),
    
    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    
    /// Database operation errors
    #[error("Database error: {0}")]
    DatabaseError(String),
    
    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    
    /// Internal system errors
    #[error("Internal error: {0}")]
    InternalError(String),
    
    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RustCareError {
    /// Category used to decide whether a caller may retry
    pub fn category(&self) -> ErrorCategory {
        match self {
            RustCareError::ValidationError(_) => ErrorCategory::Validation,
            RustCareError::BusinessError(_)
            | RustCareError::ConflictError(_)
            | RustCareError::NotFound(_) => ErrorCategory::State,
            RustCareError::DatabaseError(_)
            | RustCareError::ConfigError(_)
            | RustCareError::InternalError(_)
            | RustCareError::Other(_) => ErrorCategory::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RustCareError::DatabaseError(_))
    }
}

/// Result type alias for RustCare operations
pub type Result<T> = std::result::Result<T, RustCareError>;

/// Async logging function for errors
pub async fn log_error(operation: &str, context: &ErrorContext, error: &RustCareError) {
    tracing::error!(
        operation = operation,
        error_id = %context.error_id,
        occurred_at = %context.occurred_at,
        category = %error.category(),
        context = %context.to_json(),
        error = %error,
        "RustCare error occurred"
    );
}
