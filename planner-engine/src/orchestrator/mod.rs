//! Job orchestrator.
//!
//! Runs planning passes as background jobs, one in flight per portfolio hash:
//!
//! ```text
//! submit ──► per-hash lock ──► in flight? ──yes──► policy: return existing | wait
//!                 │                 │                force: cancel, wait, start new
//!                 │                 │                (the lock is released while waiting)
//!                 │                 no
//!                 ▼                 ▼
//!              Queued ──► Running (spawn_blocking: SequencePlanner::plan)
//!                             │
//!                             ├──► Completed (best plan persisted)
//!                             ├──► Cancelled
//!                             └──► Failed (error recorded)
//! ```
//!
//! Every job ends in a terminal state, including when the planning task panics.

pub mod job;
pub mod store;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use planner_common::logging::generate_trace_id;
use planner_common::{Error, InFlightPolicy, OrchestratorConfig, Result, Validate};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub use job::{JobEvent, JobRecord, JobState, PlanStatus};
pub use store::{open_store, InMemoryPlanStore, PlanStore, SqlitePlanStore, StoredPlan};

use crate::config::PlannerConfiguration;
use crate::evaluation::{Cancellable, CancellationToken, DetailedProgressCallback, WorkerPool};
use crate::hash::portfolio_hash;
use crate::model::ProgressUpdate;
use crate::planner::{PlanOutcome, PlanningInput, SequencePlanner};

/// A request to plan for one portfolio snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Computed from the inputs when absent
    #[serde(default)]
    pub portfolio_hash: Option<String>,
    /// Overrides the service's planner configuration
    #[serde(default)]
    pub configuration: Option<PlannerConfiguration>,
    #[serde(flatten)]
    pub input: PlanningInput,
    /// Cancel a running job for the same hash and start over
    #[serde(default)]
    pub force: bool,
}

/// Answer to a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: String,
    pub portfolio_hash: String,
    pub config_id: String,
    /// True when an in-flight job was returned instead of a new one
    pub existing: bool,
}

struct InFlight {
    job_id: String,
    config_id: String,
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Inner {
    pool: Arc<WorkerPool>,
    store: Arc<dyn PlanStore>,
    default_config: PlannerConfiguration,
    settings: OrchestratorConfig,
    jobs: RwLock<VecDeque<JobRecord>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    events: broadcast::Sender<JobEvent>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(
        pool: Arc<WorkerPool>,
        store: Arc<dyn PlanStore>,
        default_config: PlannerConfiguration,
        settings: OrchestratorConfig,
        channel_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                pool,
                store,
                default_config,
                settings,
                jobs: RwLock::new(VecDeque::new()),
                in_flight: Mutex::new(HashMap::new()),
                key_locks: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Subscribe to job state changes and progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.inner.pool
    }

    pub fn default_config(&self) -> &PlannerConfiguration {
        &self.inner.default_config
    }

    async fn key_lock(&self, portfolio_hash: &str) -> Arc<Mutex<()>> {
        self.inner
            .key_locks
            .lock()
            .await
            .entry(portfolio_hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start a generation job, or hand back the one already running for the
    /// same portfolio hash.
    ///
    /// Configuration and input problems are reported here, before any job is
    /// created. The per-hash lock is not held while waiting on a running job.
    pub async fn submit(&self, request: GenerationRequest) -> Result<Submission> {
        let config = match request.configuration {
            Some(config) => {
                config.validate()?;
                config
            }
            None => self.inner.default_config.clone(),
        };
        request.input.validate()?;
        let config_id = config.config_id().to_string();
        let planner = Arc::new(SequencePlanner::new(self.inner.pool.clone(), config)?);

        let input = request.input;
        let hash = request
            .portfolio_hash
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| portfolio_hash(&input.portfolio, input.available_cash_eur(), &input.opportunities));

        let lock = self.key_lock(&hash).await;
        loop {
            let guard = lock.lock().await;

            let running = self
                .inner
                .in_flight
                .lock()
                .await
                .get(&hash)
                .map(|f| (f.job_id.clone(), f.config_id.clone(), f.token.clone(), f.done.clone()));

            let Some((job_id, existing_config, token, mut done)) = running else {
                let submission = self.start_job(hash, config_id, planner, input).await;
                drop(guard);
                return Ok(submission);
            };

            let existing = Submission {
                job_id,
                portfolio_hash: hash.clone(),
                config_id: existing_config,
                existing: true,
            };
            let wait = self.inner.settings.in_flight_policy == InFlightPolicy::Wait;
            if !request.force && !wait {
                return Ok(existing);
            }

            if request.force {
                info!(portfolio_hash = %hash, job_id = %existing.job_id, "Force resubmission, cancelling running job");
                token.cancel();
            } else {
                debug!(portfolio_hash = %hash, job_id = %existing.job_id, "Waiting for in-flight job");
            }
            drop(guard);
            let _ = done.wait_for(|finished| *finished).await;

            if !request.force {
                return Ok(existing);
            }
            // Re-check under the lock; another submission may have started a job meanwhile.
        }
    }

    /// Register and spawn a new job. Callers hold the per-hash lock.
    async fn start_job(
        &self,
        hash: String,
        config_id: String,
        planner: Arc<SequencePlanner>,
        input: PlanningInput,
    ) -> Submission {
        let job_id = generate_trace_id();
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        self.push_job(JobRecord::queued(job_id.clone(), hash.clone(), config_id.clone()))
            .await;
        self.inner.in_flight.lock().await.insert(
            hash.clone(),
            InFlight {
                job_id: job_id.clone(),
                config_id: config_id.clone(),
                token: token.clone(),
                done: done_rx,
            },
        );
        self.emit_state(&job_id, &hash, JobState::Queued, None);
        info!(job_id = %job_id, portfolio_hash = %hash, config_id = %config_id, "Generation job queued");

        let this = self.clone();
        let spawned_id = job_id.clone();
        let spawned_hash = hash.clone();
        tokio::spawn(async move {
            this.run_job(spawned_id, spawned_hash, planner, input, token, done_tx)
                .await;
        });

        Submission {
            job_id,
            portfolio_hash: hash,
            config_id,
            existing: false,
        }
    }

    async fn run_job(
        &self,
        job_id: String,
        hash: String,
        planner: Arc<SequencePlanner>,
        input: PlanningInput,
        token: CancellationToken,
        done: watch::Sender<bool>,
    ) {
        self.update_job(&job_id, JobRecord::start).await;
        self.emit_state(&job_id, &hash, JobState::Running, None);
        info!(job_id = %job_id, portfolio_hash = %hash, "Generation job running");

        let events = self.inner.events.clone();
        let (task_job_id, task_hash, task_token) = (job_id.clone(), hash.clone(), token.clone());
        let joined = tokio::task::spawn_blocking(move || {
            let progress: DetailedProgressCallback<'_> = &|update: ProgressUpdate| {
                let _ = events.send(JobEvent::Progress {
                    job_id: task_job_id.clone(),
                    portfolio_hash: task_hash.clone(),
                    update,
                });
            };
            planner.plan(&task_token, &input, &task_hash, Some(progress))
        })
        .await;

        let (state, error, outcome) = match joined {
            Ok(Ok(outcome)) if outcome.cancelled => (JobState::Cancelled, None, Some(outcome)),
            Ok(Ok(outcome)) => match self.persist(&job_id, &outcome).await {
                Ok(()) => (JobState::Completed, None, Some(outcome)),
                Err(e) => (JobState::Failed, Some(e.to_string()), Some(outcome)),
            },
            Ok(Err(e)) if e.is_cancelled() => (JobState::Cancelled, None, None),
            Ok(Err(e)) => (JobState::Failed, Some(e.to_string()), None),
            Err(e) => (JobState::Failed, Some(format!("planning task aborted: {e}")), None),
        };

        self.update_job(&job_id, |job| {
            if let Some(outcome) = &outcome {
                job.sequences_generated = outcome.sequences_generated;
                job.sequences_evaluated = outcome.sequences_evaluated;
                job.best_score = outcome.best.as_ref().map(|b| b.result.score);
            }
            job.finish(state, error.clone());
        })
        .await;

        match &error {
            Some(reason) => error!(job_id = %job_id, portfolio_hash = %hash, error = %reason, "Generation job failed"),
            None => info!(job_id = %job_id, portfolio_hash = %hash, state = %state, "Generation job finished"),
        }
        self.emit_state(&job_id, &hash, state, error);

        {
            let mut in_flight = self.inner.in_flight.lock().await;
            if in_flight.get(&hash).is_some_and(|f| f.job_id == job_id) {
                in_flight.remove(&hash);
            }
        }
        let _ = done.send(true);
    }

    async fn persist(&self, job_id: &str, outcome: &PlanOutcome) -> Result<()> {
        let Some(best) = &outcome.best else {
            warn!(portfolio_hash = %outcome.portfolio_hash, "No feasible sequence, nothing persisted");
            return Ok(());
        };

        let plan = StoredPlan {
            portfolio_hash: outcome.portfolio_hash.clone(),
            config_id: outcome.config_id.clone(),
            job_id: job_id.to_string(),
            sequence: best.sequence.clone(),
            result: best.result.clone(),
            created_at: Utc::now(),
        };
        self.inner.store.save(&plan).await?;
        info!(
            portfolio_hash = %plan.portfolio_hash,
            config_id = %plan.config_id,
            score = plan.result.score,
            "Best plan persisted"
        );
        Ok(())
    }

    fn emit_state(&self, job_id: &str, hash: &str, state: JobState, error: Option<String>) {
        let _ = self.inner.events.send(JobEvent::StateChanged {
            job_id: job_id.to_string(),
            portfolio_hash: hash.to_string(),
            state,
            error,
        });
    }

    async fn push_job(&self, record: JobRecord) {
        let mut jobs = self.inner.jobs.write().await;
        jobs.push_back(record);

        // Evict the oldest finished jobs; running ones are never dropped.
        while jobs.len() > self.inner.settings.history_limit.max(1) {
            match jobs.iter().position(|j| j.state.is_terminal()) {
                Some(pos) => {
                    jobs.remove(pos);
                }
                None => break,
            }
        }
    }

    async fn update_job(&self, job_id: &str, f: impl FnOnce(&mut JobRecord)) {
        let mut jobs = self.inner.jobs.write().await;
        if let Some(job) = jobs.iter_mut().rev().find(|j| j.job_id == job_id) {
            f(job);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Request cancellation of a running job.
    pub async fn cancel(&self, job_id: &str) -> Result<JobRecord> {
        let job = self
            .job(job_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
        if job.state.is_terminal() {
            return Err(Error::Conflict(format!("job {job_id} already {}", job.state)));
        }

        if let Some(flight) = self.inner.in_flight.lock().await.get(&job.portfolio_hash) {
            if flight.job_id == job_id {
                flight.token.cancel();
                info!(job_id = %job_id, "Cancellation requested");
            }
        }
        Ok(job)
    }

    pub async fn job(&self, job_id: &str) -> Option<JobRecord> {
        self.inner
            .jobs
            .read()
            .await
            .iter()
            .rev()
            .find(|j| j.job_id == job_id)
            .cloned()
    }

    /// Wait until a job reaches a terminal state.
    pub async fn wait(&self, job_id: &str) -> Result<JobRecord> {
        let job = self
            .job(job_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;

        let done = self
            .inner
            .in_flight
            .lock()
            .await
            .get(&job.portfolio_hash)
            .filter(|f| f.job_id == job_id)
            .map(|f| f.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.job(job_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))
    }

    /// Status of the most recent job for a portfolio hash.
    pub async fn status(&self, portfolio_hash: &str) -> Result<PlanStatus> {
        self.inner
            .jobs
            .read()
            .await
            .iter()
            .rev()
            .find(|j| j.portfolio_hash == portfolio_hash)
            .map(PlanStatus::from)
            .ok_or_else(|| Error::NotFound(format!("no jobs for portfolio {portfolio_hash}")))
    }

    pub async fn best_plan(&self, portfolio_hash: &str, config_id: &str) -> Result<Option<StoredPlan>> {
        let lock = self.key_lock(portfolio_hash).await;
        let _guard = lock.lock().await;
        self.inner.store.load(portfolio_hash, config_id).await
    }

    /// Newest first.
    pub async fn recent_jobs(&self, limit: usize) -> Vec<JobRecord> {
        self.inner
            .jobs
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::tests::sample_context;

    fn orchestrator() -> JobOrchestrator {
        JobOrchestrator::new(
            Arc::new(WorkerPool::new(2).unwrap()),
            Arc::new(InMemoryPlanStore::new()),
            PlannerConfiguration::default(),
            OrchestratorConfig::default(),
            64,
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            input: PlanningInput {
                opportunities: sample_context(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_job_completes_and_persists() {
        let orch = orchestrator();
        let submission = orch.submit(request()).await.unwrap();
        assert!(!submission.existing);
        assert_eq!(submission.portfolio_hash.len(), crate::hash::PORTFOLIO_HASH_LEN);

        let job = orch.wait(&submission.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.best_score.is_some());

        let plan = orch.best_plan(&submission.portfolio_hash, "default").await.unwrap().unwrap();
        assert_eq!(plan.job_id, submission.job_id);
        assert_eq!(orch.status(&submission.portfolio_hash).await.unwrap().status, JobState::Completed);
    }

    #[tokio::test]
    async fn test_invalid_configuration_rejected_before_job() {
        let orch = orchestrator();
        let mut req = request();
        req.configuration = Some(PlannerConfiguration {
            optimizer_blend: 2.0,
            ..Default::default()
        });
        assert!(orch.submit(req).await.unwrap_err().is_validation());
        assert!(orch.recent_jobs(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_job() {
        let orch = orchestrator();
        let mut req = request();
        req.input.price_adjustments = Some(crate::model::PriceAdjustments {
            global_multiplier: -1.0,
            ..Default::default()
        });
        assert!(orch.submit(req).await.unwrap_err().is_validation());
        assert!(orch.recent_jobs(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let orch = orchestrator();
        assert!(matches!(orch.cancel("nope").await, Err(Error::NotFound(_))));
        assert!(orch.job("nope").await.is_none());
        assert!(matches!(orch.status("nohash").await, Err(Error::NotFound(_))));
    }
}
