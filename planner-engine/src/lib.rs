//! Planner Engine
//!
//! Sequence generation and parallel evaluation for portfolio trade planning.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     planner-engine (Rust Service)                    │
//! │                                :4450                                 │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐  │
//! │  │  Generators  │──►│   Filters    │──►│  Worker Pool (rayon)     │  │
//! │  └──────────────┘   └──────────────┘   │  simulation + scoring    │  │
//! │                                        └────────────┬─────────────┘  │
//! │  ┌──────────────────────────────┐                   │                │
//! │  │  Job Orchestrator            │◄──────────────────┘                │
//! │  │  one job per portfolio hash  │──► PlanStore (memory | sqlite)     │
//! │  └──────────────────────────────┘──► progress broadcast              │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! - **Feasibility** is decided by the running cash balance in execution
//!   order, so a sell only funds the buys after it.
//! - **Ordering**: batch results always follow input order, whatever order
//!   the workers finish in.
//! - **Cancellation** is cooperative: a started sequence is always finished,
//!   and the results completed so far are returned.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod evaluation;
pub mod filters;
pub mod generators;
pub mod hash;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod robustness;
pub mod routes;
pub mod scoring;
pub mod simulation;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use planner_common::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use config::PlannerConfiguration;
pub use evaluation::{CancellationToken, WorkerPool};
pub use orchestrator::{GenerationRequest, JobOrchestrator, JobState};
pub use planner::{PlanningInput, SequencePlanner};

use crate::routes::AppState;

/// Build the HTTP router with CORS middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        // Synchronous evaluation
        .route("/api/v1/evaluate/batch", post(routes::evaluate_batch))
        .route("/api/v1/evaluate/single", post(routes::evaluate_single_sequence))
        .route("/api/v1/evaluate/compare", post(routes::compare_sequences))
        .route("/api/v1/evaluate/monte-carlo", post(routes::monte_carlo))
        .route("/api/v1/evaluate/stochastic", post(routes::stochastic))
        .route("/api/v1/simulate/batch", post(routes::simulate_batch))
        // Planner jobs
        .route("/api/v1/planner/jobs", post(routes::submit_job).get(routes::list_jobs))
        .route("/api/v1/planner/jobs/:id", get(routes::get_job))
        .route("/api/v1/planner/jobs/:id/cancel", post(routes::cancel_job))
        .route("/api/v1/planner/status/:portfolio_hash", get(routes::plan_status))
        .route("/api/v1/planner/best/:portfolio_hash", get(routes::best_plan))
        .with_state(state)
        .layer(cors)
}

/// The planner service: worker pool, orchestrator and HTTP server.
pub struct PlannerService {
    config: Config,
    orchestrator: JobOrchestrator,
}

impl PlannerService {
    /// Wire the service from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let planner_config =
            PlannerConfiguration::from_config(&config).context("Invalid planner configuration")?;
        let pool = Arc::new(WorkerPool::from_config(&config.evaluation).context("Failed to create worker pool")?);
        let store = orchestrator::open_store(&config.storage).context("Failed to open plan store")?;

        tracing::info!(
            workers = pool.workers(),
            backend = ?config.storage.backend,
            config_id = %planner_config.config_id(),
            generators = planner_config.enabled_generators.len(),
            filters = planner_config.enabled_filters.len(),
            "Planner service configured"
        );

        let orchestrator = JobOrchestrator::new(
            pool,
            store,
            planner_config,
            config.orchestrator.clone(),
            config.evaluation.progress_channel_capacity,
        );

        Ok(Self { config, orchestrator })
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    /// Serve HTTP until the process is stopped.
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_address()
            .parse()
            .context("Invalid listen address")?;

        // Relay job events to the log.
        let mut events = self.orchestrator.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_terminal() => {
                        tracing::debug!(job_id = %event.job_id(), "Job reached terminal state");
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Progress relay lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let app = build_router(Arc::new(AppState::new(self.orchestrator)));

        tracing::info!(address = %addr, "Starting HTTP server");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
