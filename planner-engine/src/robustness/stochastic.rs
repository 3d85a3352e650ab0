//! Discrete price-shift scenarios.

use planner_common::validation::{collect_errors, ensure_non_negative};
use planner_common::{Result, Validate, ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::evaluation::{evaluate_sequence, WorkerPool};
use crate::model::{ActionSequence, EvaluationContext, PriceAdjustments};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StochasticRequest {
    pub sequence: ActionSequence,
    #[serde(alias = "evaluation_context")]
    pub context: EvaluationContext,
    /// Uniform price shifts, e.g. `-0.1` for a 10% drop
    pub shifts: Vec<f64>,
    /// Optional scenario weights, one per shift
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

impl Validate for StochasticRequest {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.sequence.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "sequence".into(),
            });
        }
        if self.shifts.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "shifts".into(),
            });
        }
        for shift in &self.shifts {
            if !shift.is_finite() || *shift <= -1.0 {
                errors.push(ValidationError::InvalidValue {
                    field: "shifts".into(),
                    reason: format!("shift {shift} would make prices non-positive"),
                });
            }
        }

        if let Some(weights) = &self.weights {
            if weights.len() != self.shifts.len() {
                errors.push(ValidationError::Conflict {
                    reason: format!(
                        "{} weights given for {} shifts",
                        weights.len(),
                        self.shifts.len()
                    ),
                });
            }
            for w in weights {
                if let Err(e) = ensure_non_negative("weights", *w) {
                    errors.push(e);
                }
            }
            if weights.iter().sum::<f64>() <= 0.0 {
                errors.push(ValidationError::InvalidValue {
                    field: "weights".into(),
                    reason: "weights must have a positive sum".into(),
                });
            }
        }

        if let Err(e) = self.context.validate() {
            errors.push(e);
        }
        collect_errors(errors)
    }
}

/// Outcome of the sequence under one shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub shift: f64,
    pub feasible: bool,
    pub score: f64,
    pub end_cash_eur: f64,
    pub transaction_costs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochasticResult {
    /// One entry per shift, in request order
    pub scenarios: Vec<ScenarioOutcome>,
    pub avg_score: f64,
    pub worst_score: f64,
    pub best_score: f64,
    /// Weighted mean when weights are given, otherwise the plain mean
    pub weighted_score: f64,
}

/// Evaluate the sequence once per shift.
pub fn evaluate_stochastic(pool: &WorkerPool, request: &StochasticRequest) -> Result<StochasticResult> {
    request.validate()?;

    let scenarios: Vec<ScenarioOutcome> = pool
        .map_ordered(&request.shifts, None, |_, shift| {
            let adjustments = PriceAdjustments::uniform_shift(*shift);
            let result = evaluate_sequence(&request.sequence, &request.context, "", Some(&adjustments));
            ScenarioOutcome {
                shift: *shift,
                feasible: result.feasible,
                score: result.score,
                end_cash_eur: result.end_cash_eur,
                transaction_costs: result.transaction_costs,
            }
        })
        .into_iter()
        .flatten()
        .collect();

    let scores: Vec<f64> = scenarios.iter().map(|s| s.score).collect();
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;

    let weighted = match &request.weights {
        Some(weights) => {
            let total: f64 = weights.iter().sum();
            scores.iter().zip(weights).map(|(s, w)| s * w).sum::<f64>() / total
        }
        None => avg,
    };

    let result = StochasticResult {
        avg_score: avg,
        worst_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
        best_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        weighted_score: weighted,
        scenarios,
    };

    info!(
        scenarios = result.scenarios.len(),
        weighted_score = result.weighted_score,
        "Stochastic evaluation completed"
    );

    Ok(result)
}
