//! Error types for the sequence planner.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the planner error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for planner services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request failed validation before any work was done
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A batch evaluation was requested with no sequences
    #[error("Empty batch: no sequences to evaluate")]
    EmptyBatch,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting concurrent operation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Persistence layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a validation error (including invalid input).
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) | Self::InvalidInput(_) => true,
            Self::WithContext { source, .. } => source.is_validation(),
            _ => false,
        }
    }

    /// Check if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::Validation(_) | Self::EmptyBatch | Self::Json(_) => 400,
            Self::NotFound(_) => 404,
            Self::Timeout => 408,
            Self::Conflict(_) => 409,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
