//! Job orchestrator lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use planner_common::{Error, InFlightPolicy, OrchestratorConfig, Result};
use planner_engine::evaluation::WorkerPool;
use planner_engine::orchestrator::{
    GenerationRequest, InMemoryPlanStore, JobEvent, JobOrchestrator, JobState, PlanStore, StoredPlan,
};
use planner_engine::planner::PlanningInput;
use planner_engine::PlannerConfiguration;
use tokio::sync::Semaphore;
use tokio_test::assert_ok;

use common::{opportunities, portfolio};

/// Store whose writes block until the test releases them.
struct GatedStore {
    gate: Semaphore,
    inner: InMemoryPlanStore,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            inner: InMemoryPlanStore::new(),
        }
    }

    fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl PlanStore for GatedStore {
    async fn save(&self, plan: &StoredPlan) -> Result<()> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        permit.forget();
        self.inner.save(plan).await
    }

    async fn load(&self, portfolio_hash: &str, config_id: &str) -> Result<Option<StoredPlan>> {
        self.inner.load(portfolio_hash, config_id).await
    }

    async fn list(&self, portfolio_hash: &str) -> Result<Vec<StoredPlan>> {
        self.inner.list(portfolio_hash).await
    }
}

struct FailingStore;

#[async_trait]
impl PlanStore for FailingStore {
    async fn save(&self, _plan: &StoredPlan) -> Result<()> {
        Err(Error::Storage("disk full".into()))
    }

    async fn load(&self, _portfolio_hash: &str, _config_id: &str) -> Result<Option<StoredPlan>> {
        Ok(None)
    }

    async fn list(&self, _portfolio_hash: &str) -> Result<Vec<StoredPlan>> {
        Ok(Vec::new())
    }
}

fn orchestrator_with(store: Arc<dyn PlanStore>, policy: InFlightPolicy) -> JobOrchestrator {
    JobOrchestrator::new(
        Arc::new(WorkerPool::new(4).unwrap()),
        store,
        PlannerConfiguration::default(),
        OrchestratorConfig {
            in_flight_policy: policy,
            history_limit: 50,
        },
        1024,
    )
}

fn request() -> GenerationRequest {
    GenerationRequest {
        input: PlanningInput {
            portfolio: portfolio(),
            opportunities: opportunities(),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn wait_until_running(orch: &JobOrchestrator, job_id: &str) {
    for _ in 0..200 {
        if orch.job(job_id).await.is_some_and(|j| j.state == JobState::Running) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never started");
}

#[tokio::test]
async fn test_lifecycle_emits_states_and_persists() {
    let orch = orchestrator_with(Arc::new(InMemoryPlanStore::new()), InFlightPolicy::ReturnExisting);
    let mut events = orch.subscribe();

    let submission = orch.submit(request()).await.unwrap();
    let job = orch.wait(&submission.job_id).await.unwrap();

    assert_eq!(job.state, JobState::Completed);
    assert!(job.sequences_generated > 0);
    assert!(job.started_at.is_some() && job.completed_at.is_some());
    assert!(job.error.is_none());

    let mut states = Vec::new();
    let mut saw_progress = false;
    while let Ok(event) = events.try_recv() {
        match event {
            JobEvent::StateChanged { state, .. } => states.push(state),
            JobEvent::Progress { .. } => saw_progress = true,
        }
    }
    assert_eq!(states, vec![JobState::Queued, JobState::Running, JobState::Completed]);
    assert!(saw_progress);

    let plan = assert_ok!(orch.best_plan(&submission.portfolio_hash, "default").await).unwrap();
    assert!(plan.result.feasible);
    assert_eq!(plan.result.portfolio_hash, submission.portfolio_hash);

    let status = orch.status(&submission.portfolio_hash).await.unwrap();
    assert_eq!(status.status, JobState::Completed);
    assert!(status.duration.is_some());
}

#[tokio::test]
async fn test_in_flight_job_is_returned() {
    let store = Arc::new(GatedStore::new());
    let orch = orchestrator_with(store.clone(), InFlightPolicy::ReturnExisting);

    let first = orch.submit(request()).await.unwrap();
    wait_until_running(&orch, &first.job_id).await;

    let second = orch.submit(request()).await.unwrap();
    assert!(second.existing);
    assert_eq!(second.job_id, first.job_id);
    assert_eq!(orch.recent_jobs(10).await.len(), 1);

    store.release(1);
    assert_eq!(orch.wait(&first.job_id).await.unwrap().state, JobState::Completed);

    // Once finished, the same hash starts a new job.
    let third = orch.submit(request()).await.unwrap();
    assert!(!third.existing);
    assert_ne!(third.job_id, first.job_id);
    store.release(1);
    orch.wait(&third.job_id).await.unwrap();
}

#[tokio::test]
async fn test_wait_policy_returns_after_completion() {
    let store = Arc::new(GatedStore::new());
    let orch = orchestrator_with(store.clone(), InFlightPolicy::Wait);

    let first = orch.submit(request()).await.unwrap();
    wait_until_running(&orch, &first.job_id).await;

    let waiter = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.submit(request()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    store.release(1);
    let second = waiter.await.unwrap().unwrap();
    assert!(second.existing);
    assert_eq!(second.job_id, first.job_id);
    assert!(orch.job(&first.job_id).await.unwrap().state.is_terminal());
}

#[tokio::test]
async fn test_waiting_submission_does_not_block_best_plan() {
    let store = Arc::new(GatedStore::new());
    let orch = orchestrator_with(store.clone(), InFlightPolicy::Wait);

    let first = orch.submit(request()).await.unwrap();
    wait_until_running(&orch, &first.job_id).await;

    let waiter = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.submit(request()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    let lookup = tokio::time::timeout(Duration::from_millis(500), orch.best_plan(&first.portfolio_hash, "default")).await;
    assert!(assert_ok!(lookup.expect("best_plan blocked by a waiting submission")).is_none());
    assert!(orch.status(&first.portfolio_hash).await.is_ok());

    store.release(1);
    let second = waiter.await.unwrap().unwrap();
    assert_eq!(second.job_id, first.job_id);
    assert!(orch.best_plan(&first.portfolio_hash, "default").await.unwrap().is_some());
}

#[tokio::test]
async fn test_force_replaces_running_job() {
    let store = Arc::new(GatedStore::new());
    let orch = orchestrator_with(store.clone(), InFlightPolicy::ReturnExisting);

    let first = orch.submit(request()).await.unwrap();
    wait_until_running(&orch, &first.job_id).await;

    // The first job finishes evaluation before the store write, so release
    // it as soon as the forced submission starts waiting.
    let forced = {
        let orch = orch.clone();
        let mut req = request();
        req.force = true;
        tokio::spawn(async move { orch.submit(req).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.release(2);

    let second = forced.await.unwrap().unwrap();
    assert!(!second.existing);
    assert_ne!(second.job_id, first.job_id);
    assert!(orch.job(&first.job_id).await.unwrap().state.is_terminal());

    let running: Vec<_> = orch
        .recent_jobs(10)
        .await
        .into_iter()
        .filter(|j| j.state == JobState::Running)
        .collect();
    assert!(running.len() <= 1);
    assert_eq!(orch.wait(&second.job_id).await.unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn test_store_failure_marks_job_failed() {
    let orch = orchestrator_with(Arc::new(FailingStore), InFlightPolicy::ReturnExisting);

    let submission = orch.submit(request()).await.unwrap();
    let job = orch.wait(&submission.job_id).await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert!(job.error.as_deref().unwrap().contains("disk full"));
    let status = orch.status(&submission.portfolio_hash).await.unwrap();
    assert_eq!(status.status, JobState::Failed);
    assert!(status.error.is_some());
}

#[tokio::test]
async fn test_cancel_finished_job_conflicts() {
    let orch = orchestrator_with(Arc::new(InMemoryPlanStore::new()), InFlightPolicy::ReturnExisting);
    let submission = orch.submit(request()).await.unwrap();
    orch.wait(&submission.job_id).await.unwrap();

    assert!(matches!(orch.cancel(&submission.job_id).await, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn test_explicit_hash_and_configuration() {
    let orch = orchestrator_with(Arc::new(InMemoryPlanStore::new()), InFlightPolicy::ReturnExisting);
    let mut req = request();
    req.portfolio_hash = Some("client-hash".into());
    req.configuration = Some(PlannerConfiguration {
        name: "sells-only".into(),
        allow_buy: false,
        ..Default::default()
    });

    let submission = orch.submit(req).await.unwrap();
    assert_eq!(submission.portfolio_hash, "client-hash");
    assert_eq!(submission.config_id, "sells-only");
    orch.wait(&submission.job_id).await.unwrap();

    let plan = orch.best_plan("client-hash", "sells-only").await.unwrap().unwrap();
    assert!(plan.sequence.actions().iter().all(|a| a.is_sell()));
    assert!(orch.best_plan("client-hash", "default").await.unwrap().is_none());
}

#[tokio::test]
async fn test_history_keeps_most_recent_finished_jobs() {
    let orch = JobOrchestrator::new(
        Arc::new(WorkerPool::new(2).unwrap()),
        Arc::new(InMemoryPlanStore::new()),
        PlannerConfiguration::default(),
        OrchestratorConfig {
            in_flight_policy: InFlightPolicy::ReturnExisting,
            history_limit: 2,
        },
        1024,
    );

    let mut ids = Vec::new();
    for i in 0..3 {
        let mut req = request();
        req.portfolio_hash = Some(format!("hash-{i}"));
        let submission = orch.submit(req).await.unwrap();
        orch.wait(&submission.job_id).await.unwrap();
        ids.push(submission.job_id);
    }

    let kept: Vec<String> = orch.recent_jobs(10).await.into_iter().map(|j| j.job_id).collect();
    assert_eq!(kept, vec![ids[2].clone(), ids[1].clone()]);
    assert!(orch.job(&ids[0]).await.is_none());
}
