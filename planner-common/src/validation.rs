//! Validation for configuration sections and incoming requests.
//!
//! Anything that reaches the evaluator is validated up front: out-of-range
//! values are rejected, never silently coerced.

use thiserror::Error;

use crate::config::{
    Config, EvaluationConfig, NetworkConfig, ObservabilityConfig, OrchestratorConfig,
    StorageBackend, StorageConfig,
};

/// Validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections and requests.
pub trait Validate {
    /// Validate this value.
    fn validate(&self) -> ValidationResult<()>;
}

/// Reject a value that is negative or not a finite number.
pub fn ensure_non_negative(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be a non-negative number, got {value}"),
        });
    }
    Ok(())
}

/// Reject an integer outside the inclusive range `[min, max]`.
pub fn ensure_in_range(field: &str, value: i64, min: i64, max: i64) -> ValidationResult<()> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

/// Reject a fraction outside `[0, 1]`.
pub fn ensure_fraction(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            min: "0".to_string(),
            max: "1".to_string(),
        });
    }
    Ok(())
}

/// Fold a list of errors into a single result.
pub fn collect_errors(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let errors: Vec<ValidationError> = [
            self.network.validate(),
            self.observability.validate(),
            self.evaluation.validate(),
            self.orchestrator.validate(),
            self.storage.validate(),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect();

        collect_errors(errors)
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(ValidationError::InvalidValue {
                field: "network.bind".into(),
                reason: format!("'{}' is not an IP address", self.bind),
            });
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidValue {
                field: "network.port".into(),
                reason: "port must be between 1 and 65535".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["json", "pretty"];

        let mut errors = Vec::new();
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {LEVELS:?}"),
            });
        }
        if !FORMATS.contains(&self.log_format.as_str()) {
            errors.push(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of {FORMATS:?}"),
            });
        }
        collect_errors(errors)
    }
}

impl Validate for EvaluationConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(workers) = self.workers {
            ensure_in_range("evaluation.workers", workers as i64, 1, 512)?;
        }
        if self.progress_channel_capacity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "evaluation.progress_channel_capacity".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Validate for OrchestratorConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.history_limit == 0 {
            return Err(ValidationError::InvalidValue {
                field: "orchestrator.history_limit".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.backend == StorageBackend::Sqlite && self.db_path.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "storage.db_path".into(),
            });
        }
        Ok(())
    }
}
