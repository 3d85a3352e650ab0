//! Monte Carlo robustness scoring of a chosen sequence.
//!
//! Each path draws one multiplicative price shock per symbol, re-evaluates
//! the sequence under those prices and records the score. Paths are seeded
//! from a base seed, so a request with a seed is reproducible.

use planner_common::validation::{collect_errors, ensure_in_range, ensure_non_negative};
use planner_common::{Result, Validate, ValidationError, ValidationResult};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::BTreeSet;
use tracing::info;

use crate::evaluation::{evaluate_sequence, WorkerPool};
use crate::model::{ActionSequence, EvaluationContext, PriceAdjustments};

pub const MIN_PATHS: i64 = 1;
pub const MAX_PATHS: i64 = 1000;

/// Prices never fall below 1% of their current value on a path.
const MIN_PRICE_MULTIPLIER: f64 = 0.01;

const WORST_WEIGHT: f64 = 0.4;
const P10_WEIGHT: f64 = 0.3;
const AVG_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloRequest {
    pub sequence: ActionSequence,
    #[serde(alias = "evaluation_context")]
    pub context: EvaluationContext,
    pub paths: i64,
    /// Standard deviation of the per-symbol price shock
    #[serde(default = "default_volatility")]
    pub volatility: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_volatility() -> f64 {
    0.15
}

impl Validate for MonteCarloRequest {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.sequence.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "sequence".into(),
            });
        }
        if let Err(e) = ensure_in_range("paths", self.paths, MIN_PATHS, MAX_PATHS) {
            errors.push(e);
        }
        if let Err(e) = ensure_non_negative("volatility", self.volatility) {
            errors.push(e);
        }
        if let Err(e) = self.context.validate() {
            errors.push(e);
        }
        collect_errors(errors)
    }
}

/// Aggregate statistics over all paths. Infeasible paths score zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub paths: usize,
    pub feasible_paths: usize,
    pub feasibility_rate: f64,
    pub avg_score: f64,
    pub std_dev: f64,
    pub worst_score: f64,
    pub best_score: f64,
    pub p10_score: f64,
    pub p50_score: f64,
    pub p90_score: f64,
    /// `0.4·worst + 0.3·p10 + 0.3·avg`
    pub final_score: f64,
    pub seed: u64,
}

/// Run the request's paths on `pool`.
///
/// The request is validated before any path runs.
pub fn evaluate_monte_carlo(pool: &WorkerPool, request: &MonteCarloRequest) -> Result<MonteCarloResult> {
    request.validate()?;

    let seed = request.seed.unwrap_or_else(rand::random);
    // A zero-width distribution is rejected by statrs; zero volatility means no shock.
    let shock = (request.volatility > 0.0)
        .then(|| Normal::new(0.0, request.volatility).ok())
        .flatten();

    let symbols: BTreeSet<&str> = request.sequence.symbols().collect();
    let path_ids: Vec<u64> = (0..request.paths as u64).collect();

    let outcomes = pool.map_ordered(&path_ids, None, |_, path| {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(*path));
        let mut adjustments = PriceAdjustments::default();
        if let Some(normal) = &shock {
            for symbol in &symbols {
                let multiplier = (1.0 + normal.sample(&mut rng)).max(MIN_PRICE_MULTIPLIER);
                adjustments.price_multipliers.insert((*symbol).to_string(), multiplier);
            }
        }
        let result = evaluate_sequence(&request.sequence, &request.context, "", Some(&adjustments));
        (result.feasible, result.score)
    });

    let (feasible, scores): (Vec<bool>, Vec<f64>) = outcomes.into_iter().flatten().unzip();
    let result = aggregate(&scores, feasible.iter().filter(|f| **f).count(), seed);

    info!(
        paths = result.paths,
        feasible_paths = result.feasible_paths,
        final_score = result.final_score,
        "Monte Carlo evaluation completed"
    );

    Ok(result)
}

fn aggregate(scores: &[f64], feasible_paths: usize, seed: u64) -> MonteCarloResult {
    let n = scores.len();
    let avg = Statistics::mean(scores.iter());
    let std_dev = if n < 2 {
        0.0
    } else {
        Statistics::std_dev(scores.iter())
    };

    let worst = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut data = Data::new(scores.to_vec());
    let p10 = data.percentile(10);
    let p50 = data.percentile(50);
    let p90 = data.percentile(90);

    MonteCarloResult {
        paths: n,
        feasible_paths,
        feasibility_rate: feasible_paths as f64 / n as f64,
        avg_score: avg,
        std_dev,
        worst_score: worst,
        best_score: best,
        p10_score: p10,
        p50_score: p50,
        p90_score: p90,
        final_score: WORST_WEIGHT * worst + P10_WEIGHT * p10 + AVG_WEIGHT * avg,
        seed,
    }
}
