//! Worker pool ordering, progress and cancellation.

mod common;

use std::collections::HashSet;
use std::sync::Mutex;

use planner_common::Error;
use planner_engine::evaluation::{Cancellable, CancellationToken, WorkerPool, DEFAULT_WORKERS};
use planner_engine::model::{ProgressPhase, ProgressUpdate};
use proptest::prelude::*;
use test_case::test_case;

use common::{buy, context, sell, seq, sequences};

#[test_case(0, DEFAULT_WORKERS ; "zero uses default")]
#[test_case(-1, DEFAULT_WORKERS ; "negative uses default")]
#[test_case(5, 5 ; "explicit size")]
fn test_pool_size(requested: i64, expected: usize) {
    assert_eq!(WorkerPool::new(requested).unwrap().workers(), expected);
}

#[test]
fn test_empty_batch_is_empty_without_callbacks() {
    let pool = WorkerPool::new(4).unwrap();
    let calls = Mutex::new(0usize);
    let cb = |_: usize, _: usize, _: &str| *calls.lock().unwrap() += 1;

    assert!(pool.evaluate_batch(&[], &context(1000.0), Some(&cb)).is_empty());
    assert!(pool.simulate_batch(&[], &context(1000.0)).is_empty());
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn test_progress_spans_every_count_once() {
    let pool = WorkerPool::new(8).unwrap();
    let input = sequences(97);
    let seen = Mutex::new(Vec::new());
    let cb = |current: usize, total: usize, _: &str| seen.lock().unwrap().push((current, total));

    let results = pool.evaluate_batch(&input, &context(1000.0), Some(&cb));
    assert_eq!(results.len(), 97);

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 97);
    assert!(seen.iter().all(|(_, total)| *total == 97));
    let currents: HashSet<usize> = seen.iter().map(|(c, _)| *c).collect();
    assert_eq!(currents, (1..=97).collect());
}

#[test]
fn test_detailed_empty_batch_errors_without_callbacks() {
    let pool = WorkerPool::new(2).unwrap();
    let calls = Mutex::new(0usize);
    let cb = |_: ProgressUpdate| *calls.lock().unwrap() += 1;

    let err = pool
        .batch_evaluate_detailed(&CancellationToken::new(), &[], "ph", None, &context(1000.0), Some(&cb))
        .unwrap_err();
    assert!(matches!(err, Error::EmptyBatch));
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn test_detailed_progress_and_tallies() {
    let pool = WorkerPool::new(4).unwrap();
    let input = vec![
        seq(vec![buy("MSFT", 500.0)]),
        seq(vec![buy("NVDA", 5000.0)]),
        seq(vec![sell("AAPL", 500.0), buy("ASML", 1200.0)]),
        seq(vec![sell("AAPL", 500.0), buy("ASML", 900.0)]),
    ];
    let updates = Mutex::new(Vec::new());
    let cb = |u: ProgressUpdate| updates.lock().unwrap().push(u);

    let batch = pool
        .batch_evaluate_detailed(&CancellationToken::new(), &input, "ph-1", None, &context(500.0), Some(&cb))
        .unwrap();

    assert!(!batch.cancelled);
    assert_eq!(batch.evaluated, 4);
    assert_eq!(batch.feasible_count, 2);
    assert_eq!(batch.infeasible_count, 2);
    assert!(batch.best_score.is_some());

    let feasible: Vec<bool> = batch.results.iter().map(|r| r.feasible).collect();
    assert_eq!(feasible, vec![true, false, false, true]);
    for (result, sequence) in batch.results.iter().zip(&input) {
        assert_eq!(result.portfolio_hash, "ph-1");
        assert_eq!(result.sequence_hash, sequence.sequence_hash());
    }

    let updates = updates.into_inner().unwrap();
    let last = updates.last().unwrap();
    assert_eq!(last.phase, ProgressPhase::SequenceEvaluation);
    assert_eq!(last.current, 4);
    for key in [
        "workers_active",
        "feasible_count",
        "infeasible_count",
        "best_score",
        "elapsed_ms",
        "sequences_per_second",
    ] {
        assert!(last.detail(key).is_some(), "missing detail {key}");
    }
    assert_eq!(last.detail("feasible_count").and_then(|v| v.as_u64()), Some(2));
}

#[test]
fn test_cancelled_before_start_returns_nothing() {
    let pool = WorkerPool::new(4).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let batch = pool
        .batch_evaluate_detailed(&token, &sequences(50), "ph", None, &context(1000.0), None)
        .unwrap();
    assert!(batch.cancelled);
    assert_eq!(batch.evaluated, 0);
    assert!(batch.results.is_empty());
}

#[test]
fn test_cancel_midway_keeps_whole_results_in_order() {
    // A single worker checks the token before every item, so cancelling from
    // the first progress update stops the batch right there.
    let pool = WorkerPool::new(1).unwrap();
    let token = CancellationToken::new();
    let input = sequences(400);
    let first_update = Mutex::new(None);
    let cb = |u: ProgressUpdate| {
        first_update.lock().unwrap().get_or_insert(u.current);
        token.cancel();
    };

    let batch = pool
        .batch_evaluate_detailed(&token, &input, "ph", None, &context(1000.0), Some(&cb))
        .unwrap();

    let cancelled_at = first_update.lock().unwrap().expect("a progress update");
    assert_eq!(cancelled_at, 20);
    assert!(batch.cancelled);
    assert_eq!(batch.evaluated, cancelled_at);
    assert!(batch.evaluated < 400);
    assert_eq!(batch.total, 400);
    assert_eq!(batch.results.len(), batch.indices.len());
    assert!(batch.indices.windows(2).all(|w| w[0] < w[1]));
    for (result, index) in batch.results.iter().zip(&batch.indices) {
        assert_eq!(result.sequence_hash, input[*index].sequence_hash());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_results_follow_input_order(values in prop::collection::vec(1.0f64..3000.0, 1..60), workers in 1i64..9) {
        let pool = WorkerPool::new(workers).unwrap();
        let input: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| seq(vec![buy(&format!("S{i}"), *v)]))
            .collect();
        let ctx = context(1500.0);

        let results = pool.evaluate_batch(&input, &ctx, None);
        prop_assert_eq!(results.len(), input.len());
        for ((result, sequence), value) in results.iter().zip(&input).zip(&values) {
            prop_assert_eq!(&result.sequence_hash, sequence.sequence_hash());
            prop_assert_eq!(result.feasible, *value <= 1500.0);
        }

        let simulated = pool.simulate_batch(&input, &ctx);
        for (sim, sequence) in simulated.iter().zip(&input) {
            prop_assert_eq!(&sim.sequence_hash, sequence.sequence_hash());
        }
    }
}
