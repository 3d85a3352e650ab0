//! Planner Engine - trade sequence generation and parallel evaluation service.

use anyhow::Result;
use planner_common::config::Config;
use planner_common::logging::init_logging_with_exclusions;
use planner_engine::PlannerService;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_and_validate()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Planner Engine v{}", env!("CARGO_PKG_VERSION"));

    let service = PlannerService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
