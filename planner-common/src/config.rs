//! Configuration management for the sequence planner.
//!
//! The service reads a unified configuration from `~/.planner/config.json`,
//! optionally split into modular files (see [`crate::config_loader`]).
//!
//! # Configuration Priority
//!
//! 1. Environment variables (PLANNER_* prefix)
//! 2. Modular files (`planner.json`, `evaluation.json`, `storage.json`)
//! 3. `config.json`
//! 4. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PLANNER_PORT` → network.port
//! - `PLANNER_BIND_ADDRESS` → network.bind
//! - `PLANNER_LOG_LEVEL` → observability.log_level
//! - `PLANNER_WORKERS` → evaluation.workers
//! - `PLANNER_DB_PATH` → storage.db_path (also switches the backend to sqlite)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config_loader::load_modular_config;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".planner"),
        |dirs| dirs.home_dir().join(".planner"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listener port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4450
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Evaluation Configuration
// ============================================================================

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Number of evaluation workers. `None` uses the available CPU
    /// parallelism, never less than two.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Capacity of the progress broadcast channel.
    #[serde(default = "default_progress_channel_capacity")]
    pub progress_channel_capacity: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            workers: None,
            progress_channel_capacity: default_progress_channel_capacity(),
        }
    }
}

impl EvaluationConfig {
    /// Effective worker count.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().max(2))
    }
}

fn default_progress_channel_capacity() -> usize {
    256
}

// ============================================================================
// Orchestrator Configuration
// ============================================================================

/// What to do when a generation for the same portfolio hash is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InFlightPolicy {
    /// Return the running job's identifier immediately
    #[default]
    ReturnExisting,
    /// Wait for the running job to finish, then return its identifier
    Wait,
}

/// Job orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub in_flight_policy: InFlightPolicy,

    /// Number of finished jobs kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            in_flight_policy: InFlightPolicy::default(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    200
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Best-plan store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Best-plan persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database path (sqlite backend only)
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Resolved database path.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }
}

fn default_db_path() -> String {
    config_dir().join("plans.db").display().to_string()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Raw planner section. Parsed by the engine, which owns the
    /// generator and filter vocabularies.
    #[serde(default)]
    pub planner: serde_json::Value,
}

impl Config {
    /// Load configuration from the default directory, merging modular files.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir())
    }

    /// Load and merge configuration files from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(Some(dir.to_path_buf()))?;
        if value.as_object().is_some_and(|o| o.is_empty()) {
            tracing::info!(dir = %dir.display(), "No configuration files found, using defaults");
        }

        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse configuration in {}", dir.display()))
    }

    /// Load configuration from a single file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PLANNER_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Ok(bind) = std::env::var("PLANNER_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Ok(level) = std::env::var("PLANNER_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(workers) = std::env::var("PLANNER_WORKERS") {
            if let Ok(n) = workers.parse() {
                self.evaluation.workers = Some(n);
            }
        }

        if let Ok(path) = std::env::var("PLANNER_DB_PATH") {
            self.storage.db_path = path;
            self.storage.backend = StorageBackend::Sqlite;
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}
