//! Fixed-size worker pool with order-preserving batch evaluation.
//!
//! ```text
//!  sequences[0..n] ──► rayon pool (n workers) ──► slots[0..n]  (one OnceLock per index)
//!                            │                        │
//!                            │ per completion         └──► results in input order
//!                            ▼
//!                  AtomicUsize completed ──► progress(current, total, msg)
//! ```
//!
//! Each slot is written exactly once by whichever worker evaluated that
//! index, so the output order never depends on completion order.
//!
//! Progress callbacks are invoked concurrently from worker threads. The pool
//! only guarantees that `current` values are unique and span `1..=total`;
//! a callback with side effects must serialize them itself (a mutex or a
//! channel sender).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use planner_common::{Error, EvaluationConfig, Result, Validate};
use rayon::prelude::*;
use tracing::{debug, info};

use super::cancellation::{Cancellable, CancellationToken};
use super::sequence::{compare_results, evaluate_sequence, simulate, SequenceComparison};
use crate::model::{
    ActionSequence, EvaluationContext, EvaluationResult, PriceAdjustments, ProgressPhase,
    ProgressUpdate, SimulationResult,
};

/// Worker count used when a non-positive size is requested.
pub const DEFAULT_WORKERS: usize = 10;

/// Number of throttled progress updates per detailed batch, plus the final one.
const DETAILED_UPDATES_PER_BATCH: usize = 20;

/// `(current, total, message)` progress observer.
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, usize, &str) + Send + Sync);

/// Structured progress observer.
pub type DetailedProgressCallback<'a> = &'a (dyn Fn(ProgressUpdate) + Send + Sync);

// ============================================================================
// Worker Pool
// ============================================================================

/// A fixed-size pool of evaluation workers.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Create a pool with `n` workers; `n <= 0` uses [`DEFAULT_WORKERS`].
    pub fn new(n: i64) -> Result<Self> {
        let workers = usize::try_from(n).ok().filter(|w| *w > 0).unwrap_or(DEFAULT_WORKERS);
        Self::with_workers(workers)
    }

    /// Create a pool sized from configuration.
    pub fn from_config(config: &EvaluationConfig) -> Result<Self> {
        Self::with_workers(config.effective_workers().max(1))
    }

    fn with_workers(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("planner-eval-{i}"))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker pool: {e}")))?;

        debug!(workers, "Worker pool created");
        Ok(Self { pool, workers })
    }

    /// Configured worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` over `items` on the pool, returning one slot per input index.
    ///
    /// Slots stay `None` only for items skipped after `token` was cancelled;
    /// an item that started is always finished.
    pub(crate) fn map_ordered<T, R, F>(
        &self,
        items: &[T],
        token: Option<&CancellationToken>,
        f: F,
    ) -> Vec<Option<R>>
    where
        T: Sync,
        R: Send + Sync,
        F: Fn(usize, &T) -> R + Send + Sync,
    {
        let slots: Vec<OnceLock<R>> = items.iter().map(|_| OnceLock::new()).collect();

        self.pool.install(|| {
            items.par_iter().enumerate().for_each(|(i, item)| {
                if token.is_some_and(|t| t.is_cancelled()) {
                    return;
                }
                // Each index is visited once, so the slot is always empty here.
                let _ = slots[i].set(f(i, item));
            });
        });

        slots.into_iter().map(OnceLock::into_inner).collect()
    }

    // ========================================================================
    // Batch Operations
    // ========================================================================

    /// Evaluate every sequence, returning results in input order.
    ///
    /// Empty input returns an empty vector without invoking `progress`.
    /// Otherwise `progress` is called once per completed sequence.
    pub fn evaluate_batch(
        &self,
        sequences: &[ActionSequence],
        context: &EvaluationContext,
        progress: Option<ProgressCallback<'_>>,
    ) -> Vec<EvaluationResult> {
        if sequences.is_empty() {
            return Vec::new();
        }

        let total = sequences.len();
        let completed = AtomicUsize::new(0);

        let slots = self.map_ordered(sequences, None, |_, sequence| {
            let result = evaluate_sequence(sequence, context, "", None);
            let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(cb) = progress {
                cb(current, total, &format!("Evaluated {current}/{total} sequences"));
            }
            result
        });

        slots.into_iter().flatten().collect()
    }

    /// Evaluate several sequences side by side and rank them.
    pub fn compare_sequences(
        &self,
        sequences: &[ActionSequence],
        context: &EvaluationContext,
    ) -> Result<SequenceComparison> {
        if sequences.is_empty() {
            return Err(Error::InvalidInput("at least one sequence is required".into()));
        }
        context.validate()?;
        Ok(compare_results(self.evaluate_batch(sequences, context, None)))
    }

    /// Simulate every sequence without scoring, in input order.
    pub fn simulate_batch(
        &self,
        sequences: &[ActionSequence],
        context: &EvaluationContext,
    ) -> Vec<SimulationResult> {
        self.map_ordered(sequences, None, |_, sequence| simulate(sequence, context, None))
            .into_iter()
            .flatten()
            .collect()
    }

    /// Cancellable evaluation with structured progress.
    ///
    /// Fails with [`Error::EmptyBatch`] before any callback if `sequences` is
    /// empty. On cancellation the sequences already evaluated are returned
    /// with `cancelled = true`.
    pub fn batch_evaluate_detailed(
        &self,
        token: &CancellationToken,
        sequences: &[ActionSequence],
        portfolio_hash: &str,
        price_adjustments: Option<&PriceAdjustments>,
        context: &EvaluationContext,
        progress: Option<DetailedProgressCallback<'_>>,
    ) -> Result<BatchEvaluation> {
        if sequences.is_empty() {
            return Err(Error::EmptyBatch);
        }
        if let Some(adj) = price_adjustments {
            adj.validate()?;
        }

        let total = sequences.len();
        let started = Instant::now();
        let counters = BatchCounters::default();
        let interval = (total / DETAILED_UPDATES_PER_BATCH).max(1);

        info!(
            total,
            workers = self.workers,
            portfolio_hash = %portfolio_hash,
            "Starting batch evaluation"
        );

        let slots = self.map_ordered(sequences, Some(token), |_, sequence| {
            counters.active.fetch_add(1, Ordering::SeqCst);
            let result = evaluate_sequence(sequence, context, portfolio_hash, price_adjustments);
            counters.active.fetch_sub(1, Ordering::SeqCst);

            counters.record(&result);
            let current = counters.completed.fetch_add(1, Ordering::SeqCst) + 1;

            if let Some(cb) = progress {
                if current % interval == 0 && current < total {
                    cb(counters.update(current, total, started, "Evaluating sequences"));
                }
            }
            result
        });

        let mut results = Vec::with_capacity(total);
        let mut indices = Vec::with_capacity(total);
        for (i, slot) in slots.into_iter().enumerate() {
            if let Some(result) = slot {
                results.push(result);
                indices.push(i);
            }
        }

        let cancelled = results.len() < total;
        let evaluated = results.len();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(cb) = progress {
            let message = if cancelled {
                "Evaluation cancelled"
            } else {
                "Evaluation complete"
            };
            cb(counters.update(evaluated, total, started, message));
        }

        let batch = BatchEvaluation {
            results,
            indices,
            cancelled,
            evaluated,
            total,
            feasible_count: counters.feasible.load(Ordering::SeqCst),
            infeasible_count: counters.infeasible.load(Ordering::SeqCst),
            best_score: counters.best_score(),
            elapsed_ms,
        };

        info!(
            evaluated,
            total,
            feasible = batch.feasible_count,
            infeasible = batch.infeasible_count,
            cancelled,
            elapsed_ms,
            "Batch evaluation finished"
        );

        Ok(batch)
    }
}

// ============================================================================
// Batch Results
// ============================================================================

/// Output of [`WorkerPool::batch_evaluate_detailed`].
#[derive(Debug, Clone)]
pub struct BatchEvaluation {
    /// Evaluated results, in input order
    pub results: Vec<EvaluationResult>,
    /// Input index of each entry in `results`
    pub indices: Vec<usize>,
    pub cancelled: bool,
    pub evaluated: usize,
    pub total: usize,
    pub feasible_count: usize,
    pub infeasible_count: usize,
    pub best_score: Option<f64>,
    pub elapsed_ms: u64,
}

#[derive(Default)]
struct BatchCounters {
    completed: AtomicUsize,
    active: AtomicUsize,
    feasible: AtomicUsize,
    infeasible: AtomicUsize,
    /// Bits of the best feasible score. Scores are non-negative, so bit
    /// order matches numeric order.
    best_bits: AtomicU64,
}

impl BatchCounters {
    fn record(&self, result: &EvaluationResult) {
        if result.feasible {
            self.best_bits.fetch_max(result.score.max(0.0).to_bits(), Ordering::SeqCst);
            self.feasible.fetch_add(1, Ordering::SeqCst);
        } else {
            self.infeasible.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn best_score(&self) -> Option<f64> {
        (self.feasible.load(Ordering::SeqCst) > 0)
            .then(|| f64::from_bits(self.best_bits.load(Ordering::SeqCst)))
    }

    fn update(&self, current: usize, total: usize, started: Instant, message: &str) -> ProgressUpdate {
        let elapsed = started.elapsed();
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { current as f64 / secs } else { 0.0 };

        ProgressUpdate::new(ProgressPhase::SequenceEvaluation, current, total, message)
            .with_detail("workers_active", self.active.load(Ordering::SeqCst))
            .with_detail("feasible_count", self.feasible.load(Ordering::SeqCst))
            .with_detail("infeasible_count", self.infeasible.load(Ordering::SeqCst))
            .with_detail("best_score", self.best_score())
            .with_detail("elapsed_ms", elapsed.as_millis() as u64)
            .with_detail("sequences_per_second", rate)
    }
}
