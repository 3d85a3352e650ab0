//! Monte Carlo and stochastic evaluation through the public API.

mod common;

use planner_engine::evaluation::WorkerPool;
use planner_engine::robustness::{
    evaluate_monte_carlo, evaluate_stochastic, MonteCarloRequest, StochasticRequest, MAX_PATHS, MIN_PATHS,
};
use test_case::test_case;

use common::{buy, context, sell, seq};

fn monte_carlo(paths: i64, seed: Option<u64>) -> MonteCarloRequest {
    MonteCarloRequest {
        sequence: seq(vec![sell("AAPL", 500.0), buy("MSFT", 900.0)]),
        context: context(500.0),
        paths,
        volatility: 0.2,
        seed,
    }
}

#[test_case(MIN_PATHS, true ; "lower bound accepted")]
#[test_case(MAX_PATHS, true ; "upper bound accepted")]
#[test_case(MIN_PATHS - 1, false ; "below range rejected")]
#[test_case(MAX_PATHS + 1, false ; "above range rejected")]
fn test_path_bounds(paths: i64, accepted: bool) {
    let pool = WorkerPool::new(4).unwrap();
    let outcome = evaluate_monte_carlo(&pool, &monte_carlo(paths, Some(7)));
    match outcome {
        Ok(result) => {
            assert!(accepted);
            assert_eq!(result.paths as i64, paths);
        }
        Err(e) => {
            assert!(!accepted);
            assert!(e.is_validation());
        }
    }
}

#[test]
fn test_final_score_blends_worst_p10_and_mean() {
    let pool = WorkerPool::new(4).unwrap();
    let result = evaluate_monte_carlo(&pool, &monte_carlo(300, Some(11))).unwrap();

    let expected = 0.4 * result.worst_score + 0.3 * result.p10_score + 0.3 * result.avg_score;
    assert!((result.final_score - expected).abs() < 1e-9);
    assert_eq!(result.seed, 11);
    assert!((0.0..=1.0).contains(&result.feasibility_rate));
}

#[test]
fn test_different_seeds_differ() {
    let pool = WorkerPool::new(4).unwrap();
    let a = evaluate_monte_carlo(&pool, &monte_carlo(100, Some(1))).unwrap();
    let b = evaluate_monte_carlo(&pool, &monte_carlo(100, Some(2))).unwrap();
    assert_ne!(a.avg_score, b.avg_score);
}

#[test]
fn test_stochastic_request_from_json() {
    let pool = WorkerPool::new(2).unwrap();
    let request: StochasticRequest = serde_json::from_value(serde_json::json!({
        "sequence": seq(vec![buy("MSFT", 400.0)]),
        "evaluation_context": context(1000.0),
        "shifts": [-0.2, -0.1, 0.0, 0.1, 0.2],
    }))
    .unwrap();

    let result = evaluate_stochastic(&pool, &request).unwrap();
    assert_eq!(result.scenarios.len(), 5);
    assert!(result.scenarios.iter().all(|s| s.feasible));
    assert!(result.worst_score <= result.avg_score && result.avg_score <= result.best_score);
}
