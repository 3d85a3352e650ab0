//! Structured progress updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fixed phase tags for progress updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Generation,
    Filtering,
    SequenceEvaluation,
    PlanningComplete,
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Filtering => write!(f, "filtering"),
            Self::SequenceEvaluation => write!(f, "sequence_evaluation"),
            Self::PlanningComplete => write!(f, "planning_complete"),
        }
    }
}

/// A progress event. `details` carries monitoring counters keyed by name.
///
/// Updates from concurrent workers may arrive out of order; `current` is
/// the completion count observed when the update was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub current: usize,
    pub total: usize,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(phase: ProgressPhase, current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            phase,
            current,
            total,
            message: message.into(),
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a detail counter.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}
