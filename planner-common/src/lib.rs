//! Planner Common - shared infrastructure for the sequence planner.
//!
//! This crate provides:
//! - Configuration types and modular loading
//! - Configuration and request validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, EvaluationConfig, InFlightPolicy, NetworkConfig, ObservabilityConfig,
    OrchestratorConfig, StorageBackend, StorageConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
