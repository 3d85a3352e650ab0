//! One planning pass: generate, filter, evaluate, select.
//!
//! ```text
//! OpportunityContext ──► generators ──► filter pipeline ──► cash-flow prefilter
//!                                                                  │
//!                    best plan ◄── select_best ◄── worker pool ◄───┘
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use planner_common::validation::{collect_errors, Validate, ValidationResult};
use planner_common::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PlannerConfiguration;
use crate::evaluation::{BatchEvaluation, Cancellable, CancellationToken, DetailedProgressCallback, WorkerPool};
use crate::filters::{FilterContext, FilterPipeline, FilterStageResult};
use crate::generators::{self, GenerationSettings};
use crate::model::{
    ActionSequence, EvaluationResult, OpportunityContext, PatternKind, PortfolioContext, PriceAdjustments,
    ProgressPhase, ProgressUpdate, SecurityMeta,
};
use crate::simulation::cannot_be_feasible;

/// Read-only inputs of a planning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningInput {
    #[serde(default)]
    pub portfolio: PortfolioContext,
    #[serde(default)]
    pub security_meta: BTreeMap<String, SecurityMeta>,
    #[serde(default)]
    pub opportunities: OpportunityContext,
    #[serde(default)]
    pub price_adjustments: Option<PriceAdjustments>,
}

impl Validate for PlanningInput {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<_> = [self.portfolio.validate(), self.opportunities.validate()]
            .into_iter()
            .filter_map(|r| r.err())
            .collect();
        if let Some(Err(e)) = self.price_adjustments.as_ref().map(Validate::validate) {
            errors.push(e);
        }
        collect_errors(errors)
    }
}

impl PlanningInput {
    pub fn available_cash_eur(&self) -> f64 {
        self.opportunities.available_cash_eur
    }
}

/// The selected sequence together with its evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPlan {
    pub sequence: ActionSequence,
    pub result: EvaluationResult,
}

/// Summary of one planning pass.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub portfolio_hash: String,
    pub config_id: String,
    pub sequences_generated: usize,
    pub per_pattern: BTreeMap<PatternKind, usize>,
    pub filter_stages: Vec<FilterStageResult>,
    /// Dropped before evaluation because their net cash flow exceeds the cash
    pub prefiltered: usize,
    pub sequences_evaluated: usize,
    pub feasible_count: usize,
    pub infeasible_count: usize,
    pub cancelled: bool,
    pub best: Option<BestPlan>,
    pub elapsed_ms: u64,
}

// ============================================================================
// Sequence Planner
// ============================================================================

pub struct SequencePlanner {
    pool: Arc<WorkerPool>,
    config: PlannerConfiguration,
    settings: GenerationSettings,
    pipeline: FilterPipeline,
}

impl SequencePlanner {
    /// Build a planner; fails if the configuration names bad parameters.
    pub fn new(pool: Arc<WorkerPool>, config: PlannerConfiguration) -> Result<Self> {
        let settings = config.generation_settings()?;
        let pipeline = config.filter_pipeline()?;
        Ok(Self {
            pool,
            config,
            settings,
            pipeline,
        })
    }

    pub fn config(&self) -> &PlannerConfiguration {
        &self.config
    }

    /// Run a full pass. Cancellation before evaluation fails with
    /// `Error::Cancelled`; during evaluation it yields a partial outcome with
    /// `cancelled = true`.
    pub fn plan(
        &self,
        token: &CancellationToken,
        input: &PlanningInput,
        portfolio_hash: &str,
        progress: Option<DetailedProgressCallback<'_>>,
    ) -> Result<PlanOutcome> {
        input.validate()?;
        let started = Instant::now();
        let emit = |update: ProgressUpdate| {
            if let Some(cb) = progress {
                cb(update);
            }
        };

        // === Generation ===
        let generated = generators::generate(&input.opportunities, &self.settings);
        let sequences_generated = generated.len();
        let mut update = ProgressUpdate::new(
            ProgressPhase::Generation,
            sequences_generated,
            sequences_generated,
            "Sequences generated",
        );
        for (pattern, count) in &generated.per_pattern {
            update = update.with_detail(pattern.as_str(), *count);
        }
        emit(update);
        token.check()?;

        // === Filtering ===
        let filter_ctx = FilterContext::new(
            &input.portfolio,
            &input.security_meta,
            &input.opportunities.security_tags,
        );
        let filtered = self.pipeline.run(generated.sequences, &filter_ctx);
        emit(
            ProgressUpdate::new(
                ProgressPhase::Filtering,
                filtered.sequences.len(),
                sequences_generated,
                "Sequences filtered",
            )
            .with_detail("stages", filtered.stages.len()),
        );
        token.check()?;

        let context = self.config.evaluation_context(
            input.available_cash_eur(),
            input.portfolio.clone(),
            input.security_meta.clone(),
        );

        // Net cash flow only bounds unadjusted values.
        let before_prefilter = filtered.sequences.len();
        let candidates: Vec<ActionSequence> = if input.price_adjustments.is_some() {
            filtered.sequences
        } else {
            filtered
                .sequences
                .into_iter()
                .filter(|s| !cannot_be_feasible(s.actions(), context.available_cash_eur))
                .collect()
        };
        let prefiltered = before_prefilter - candidates.len();
        debug!(prefiltered, remaining = candidates.len(), "Cash-flow prefilter applied");

        let mut outcome = PlanOutcome {
            portfolio_hash: portfolio_hash.to_string(),
            config_id: self.config.config_id().to_string(),
            sequences_generated,
            per_pattern: generated.per_pattern,
            filter_stages: filtered.stages,
            prefiltered,
            sequences_evaluated: 0,
            feasible_count: 0,
            infeasible_count: 0,
            cancelled: false,
            best: None,
            elapsed_ms: 0,
        };

        // === Evaluation ===
        if !candidates.is_empty() {
            let batch = self.pool.batch_evaluate_detailed(
                token,
                &candidates,
                portfolio_hash,
                input.price_adjustments.as_ref(),
                &context,
                progress,
            )?;

            outcome.sequences_evaluated = batch.evaluated;
            outcome.feasible_count = batch.feasible_count;
            outcome.infeasible_count = batch.infeasible_count;
            outcome.cancelled = batch.cancelled;
            outcome.best = select_best(&batch).map(|pos| BestPlan {
                sequence: candidates[batch.indices[pos]].clone(),
                result: batch.results[pos].clone(),
            });
        }

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;

        let best_score = outcome.best.as_ref().map(|b| b.result.score);
        emit(
            ProgressUpdate::new(
                ProgressPhase::PlanningComplete,
                outcome.sequences_evaluated,
                candidates.len(),
                "Planning complete",
            )
            .with_detail("feasible_count", outcome.feasible_count)
            .with_detail("best_score", best_score)
            .with_detail("elapsed_ms", outcome.elapsed_ms),
        );

        info!(
            portfolio_hash = %portfolio_hash,
            config_id = %outcome.config_id,
            generated = sequences_generated,
            evaluated = outcome.sequences_evaluated,
            feasible = outcome.feasible_count,
            best_score = ?best_score,
            cancelled = outcome.cancelled,
            "Planning pass finished"
        );

        Ok(outcome)
    }
}

/// Position in `batch.results` of the best feasible result.
///
/// Highest score wins; ties go to the lower transaction cost, then the
/// generator that comes first in priority order, then the earlier input.
pub fn select_best(batch: &BatchEvaluation) -> Option<usize> {
    let rank = |r: &EvaluationResult| r.pattern.map_or(usize::MAX, |p| p.priority());

    batch
        .results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.feasible)
        .min_by(|(ia, a), (ib, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    a.transaction_costs
                        .partial_cmp(&b.transaction_costs)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| rank(a).cmp(&rank(b)))
                .then_with(|| batch.indices[*ia].cmp(&batch.indices[*ib]))
        })
        .map(|(i, _)| i)
}
