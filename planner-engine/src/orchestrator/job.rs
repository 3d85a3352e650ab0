//! Job records and state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ProgressUpdate;

/// Lifecycle of a generation job.
///
/// `Queued → Running → {Completed, Failed, Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub portfolio_hash: String,
    pub config_id: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub sequences_generated: usize,
    pub sequences_evaluated: usize,
    pub best_score: Option<f64>,
    /// Human-readable reason for a failed job
    pub error: Option<String>,
}

impl JobRecord {
    pub fn queued(job_id: String, portfolio_hash: String, config_id: String) -> Self {
        Self {
            job_id,
            portfolio_hash,
            config_id,
            state: JobState::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_secs: None,
            sequences_generated: 0,
            sequences_evaluated: 0,
            best_score: None,
            error: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, state: JobState, error: Option<String>) {
        let now = Utc::now();
        let since = self.started_at.unwrap_or(self.created_at);
        self.state = state;
        self.error = error;
        self.completed_at = Some(now);
        self.duration_secs = Some((now - since).num_milliseconds() as f64 / 1000.0);
    }
}

/// Latest run for a portfolio hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatus {
    pub portfolio_hash: String,
    pub job_id: String,
    pub status: JobState,
    pub last_run: DateTime<Utc>,
    /// Seconds; unset while the job has not finished
    pub duration: Option<f64>,
    pub error: Option<String>,
}

impl From<&JobRecord> for PlanStatus {
    fn from(job: &JobRecord) -> Self {
        Self {
            portfolio_hash: job.portfolio_hash.clone(),
            job_id: job.job_id.clone(),
            status: job.state,
            last_run: job.completed_at.or(job.started_at).unwrap_or(job.created_at),
            duration: job.duration_secs,
            error: job.error.clone(),
        }
    }
}

/// Broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    StateChanged {
        job_id: String,
        portfolio_hash: String,
        state: JobState,
        error: Option<String>,
    },
    Progress {
        job_id: String,
        portfolio_hash: String,
        update: ProgressUpdate,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::StateChanged { job_id, .. } | Self::Progress { job_id, .. } => job_id,
        }
    }

    /// A state change into a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StateChanged { state, .. } if state.is_terminal())
    }
}
