//! HTTP routes for the planner service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use planner_common::{Error, Validate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::evaluation::{evaluate_single, SequenceComparison, WorkerPool};
use crate::model::{ActionSequence, EvaluationContext, EvaluationResult, SimulationResult};
use crate::orchestrator::{GenerationRequest, JobOrchestrator, JobRecord, PlanStatus, StoredPlan, Submission};
use crate::robustness::{
    evaluate_monte_carlo, evaluate_stochastic, MonteCarloRequest, MonteCarloResult, StochasticRequest,
    StochasticResult,
};

/// Shared state of the HTTP handlers.
pub struct AppState {
    pub orchestrator: JobOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: JobOrchestrator) -> Self {
        Self { orchestrator }
    }

    fn pool(&self) -> Arc<WorkerPool> {
        self.orchestrator.pool().clone()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler error carrying a planner [`Error`].
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

fn error_code(error: &Error) -> &'static str {
    match error {
        Error::Config(_) => "CONFIG_ERROR",
        Error::InvalidInput(_) => "INVALID_INPUT",
        Error::Validation(_) => "VALIDATION_ERROR",
        Error::EmptyBatch => "EMPTY_BATCH",
        Error::NotFound(_) => "NOT_FOUND",
        Error::Conflict(_) => "CONFLICT",
        Error::Cancelled => "CANCELLED",
        Error::Storage(_) => "STORAGE_ERROR",
        Error::Timeout => "TIMEOUT",
        Error::Json(_) => "INVALID_JSON",
        Error::WithContext { source, .. } => error_code(source),
        Error::Internal(_) | Error::Io(_) => "INTERNAL_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: error_code(&self.0).to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run CPU-bound work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> planner_common::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("evaluation task aborted: {e}")))?
        .map_err(ApiError)
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub workers: usize,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub sequences: Vec<ActionSequence>,
    #[serde(alias = "evaluation_context")]
    pub context: EvaluationContext,
}

#[derive(Debug, Deserialize)]
pub struct SingleRequest {
    pub sequence: ActionSequence,
    #[serde(alias = "evaluation_context")]
    pub context: EvaluationContext,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse<T> {
    pub results: Vec<T>,
    pub count: usize,
}

impl<T> From<Vec<T>> for BatchResponse<T> {
    fn from(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    #[serde(default = "default_jobs_limit")]
    pub limit: usize,
}

fn default_jobs_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobRecord>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct BestPlanQuery {
    pub config_id: Option<String>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "planner-engine".to_string(),
        workers: state.orchestrator.pool().workers(),
    })
}

/// Evaluate sequences in parallel; results follow input order.
pub async fn evaluate_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<BatchResponse<EvaluationResult>> {
    let pool = state.pool();
    let results = blocking(move || Ok(pool.evaluate_batch(&req.sequences, &req.context, None))).await?;
    Ok(Json(results.into()))
}

pub async fn evaluate_single_sequence(Json(req): Json<SingleRequest>) -> ApiResult<EvaluationResult> {
    let result = blocking(move || evaluate_single(&req.sequence, &req.context)).await?;
    Ok(Json(result))
}

pub async fn compare_sequences(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<SequenceComparison> {
    let pool = state.pool();
    let comparison = blocking(move || pool.compare_sequences(&req.sequences, &req.context)).await?;
    Ok(Json(comparison))
}

pub async fn monte_carlo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MonteCarloRequest>,
) -> ApiResult<MonteCarloResult> {
    // Reject before handing work to the pool.
    req.validate().map_err(Error::from)?;
    let pool = state.pool();
    let result = blocking(move || evaluate_monte_carlo(&pool, &req)).await?;
    Ok(Json(result))
}

pub async fn stochastic(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StochasticRequest>,
) -> ApiResult<StochasticResult> {
    req.validate().map_err(Error::from)?;
    let pool = state.pool();
    let result = blocking(move || evaluate_stochastic(&pool, &req)).await?;
    Ok(Json(result))
}

/// End states without scoring, in input order.
pub async fn simulate_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<BatchResponse<SimulationResult>> {
    let pool = state.pool();
    let results = blocking(move || Ok(pool.simulate_batch(&req.sequences, &req.context))).await?;
    Ok(Json(results.into()))
}

// ============================================================================
// Planner Job Routes
// ============================================================================

pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerationRequest>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let submission = state.orchestrator.submit(req).await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

pub async fn list_jobs(State(state): State<Arc<AppState>>, Query(query): Query<JobsQuery>) -> Json<JobsResponse> {
    let jobs = state.orchestrator.recent_jobs(query.limit).await;
    Json(JobsResponse {
        count: jobs.len(),
        jobs,
    })
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> ApiResult<JobRecord> {
    state
        .orchestrator
        .job(&job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError(Error::NotFound(format!("job {job_id}"))))
}

pub async fn cancel_job(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> ApiResult<JobRecord> {
    Ok(Json(state.orchestrator.cancel(&job_id).await?))
}

pub async fn plan_status(
    State(state): State<Arc<AppState>>,
    Path(portfolio_hash): Path<String>,
) -> ApiResult<PlanStatus> {
    Ok(Json(state.orchestrator.status(&portfolio_hash).await?))
}

pub async fn best_plan(
    State(state): State<Arc<AppState>>,
    Path(portfolio_hash): Path<String>,
    Query(query): Query<BestPlanQuery>,
) -> ApiResult<StoredPlan> {
    let config_id = query
        .config_id
        .unwrap_or_else(|| state.orchestrator.default_config().config_id().to_string());

    state
        .orchestrator
        .best_plan(&portfolio_hash, &config_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError(Error::NotFound(format!(
                "no plan for portfolio {portfolio_hash} and configuration {config_id}"
            )))
        })
}
