//! Evaluation of a single sequence: feasibility, simulation, scoring.

use planner_common::{Error, Result, Validate};
use serde::{Deserialize, Serialize};

use crate::model::{
    ActionSequence, EvaluationContext, EvaluationResult, PriceAdjustments, SimulationResult,
};
use crate::scoring::{evaluate_end_state, transaction_cost};
use crate::simulation::{check_sequence_feasibility, simulate_sequence};

/// Simulate and score one sequence against `context`.
///
/// An infeasible sequence scores zero and reports the unchanged starting
/// state; its transaction costs are still computed.
pub fn evaluate_sequence(
    sequence: &ActionSequence,
    context: &EvaluationContext,
    portfolio_hash: &str,
    adjustments: Option<&PriceAdjustments>,
) -> EvaluationResult {
    let costs = transaction_cost(sequence.actions(), &context.costs, adjustments);

    if !check_sequence_feasibility(sequence.actions(), context.available_cash_eur, adjustments) {
        return EvaluationResult {
            sequence_hash: sequence.sequence_hash().to_string(),
            portfolio_hash: portfolio_hash.to_string(),
            pattern: sequence.pattern(),
            feasible: false,
            score: 0.0,
            end_cash_eur: context.available_cash_eur,
            end_portfolio: context.portfolio.clone(),
            transaction_costs: costs,
            error: None,
        };
    }

    let outcome = simulate_sequence(
        sequence.actions(),
        &context.portfolio,
        context.available_cash_eur,
        &context.security_meta,
        adjustments,
    );
    let score = evaluate_end_state(&outcome.end_portfolio, costs, &context.scoring);

    EvaluationResult {
        sequence_hash: sequence.sequence_hash().to_string(),
        portfolio_hash: portfolio_hash.to_string(),
        pattern: sequence.pattern(),
        feasible: true,
        score,
        end_cash_eur: outcome.end_cash_eur,
        end_portfolio: outcome.end_portfolio,
        transaction_costs: costs,
        error: None,
    }
}

/// End state of one sequence, without scoring.
pub fn simulate(
    sequence: &ActionSequence,
    context: &EvaluationContext,
    adjustments: Option<&PriceAdjustments>,
) -> SimulationResult {
    let outcome = simulate_sequence(
        sequence.actions(),
        &context.portfolio,
        context.available_cash_eur,
        &context.security_meta,
        adjustments,
    );

    SimulationResult {
        sequence_hash: sequence.sequence_hash().to_string(),
        end_cash_eur: outcome.end_cash_eur,
        end_portfolio: outcome.end_portfolio,
        executed: outcome.executed,
        skipped: outcome.skipped,
    }
}

/// Validated synchronous evaluation of one sequence.
pub fn evaluate_single(sequence: &ActionSequence, context: &EvaluationContext) -> Result<EvaluationResult> {
    if sequence.is_empty() {
        return Err(Error::InvalidInput("sequence must contain at least one action".into()));
    }
    context.validate()?;
    Ok(evaluate_sequence(sequence, context, "", None))
}

// ============================================================================
// Comparison
// ============================================================================

/// Results of evaluating several sequences side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceComparison {
    pub results: Vec<EvaluationResult>,
    pub best_index: Option<usize>,
    pub worst_index: Option<usize>,
}

/// Rank results: feasible above infeasible, then by score.
/// Ties resolve to the earliest index.
pub fn compare_results(results: Vec<EvaluationResult>) -> SequenceComparison {
    let rank = |r: &EvaluationResult| (r.feasible, r.score);

    let mut best: Option<usize> = None;
    let mut worst: Option<usize> = None;
    for (i, result) in results.iter().enumerate() {
        let key = rank(result);
        if best.map_or(true, |b| key > rank(&results[b])) {
            best = Some(i);
        }
        if worst.map_or(true, |w| key < rank(&results[w])) {
            worst = Some(i);
        }
    }

    SequenceComparison {
        results,
        best_index: best,
        worst_index: worst,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionCandidate, PortfolioContext};

    fn context(cash: f64) -> EvaluationContext {
        let mut portfolio = PortfolioContext::default();
        portfolio.positions.insert("AAPL".into(), 2000.0);
        portfolio.total_value = 2000.0;
        EvaluationContext::new(cash, portfolio)
    }

    fn seq(actions: Vec<ActionCandidate>) -> ActionSequence {
        ActionSequence::new(actions, None)
    }

    #[test]
    fn test_infeasible_reports_start_state() {
        let ctx = context(100.0);
        let s = seq(vec![ActionCandidate::buy("MSFT", 1, 500.0, 500.0).unwrap()]);
        let result = evaluate_sequence(&s, &ctx, "ph", None);

        assert!(!result.feasible);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.end_cash_eur, 100.0);
        assert_eq!(result.end_portfolio, ctx.portfolio);
        assert!(result.transaction_costs > 0.0);
        assert_eq!(result.portfolio_hash, "ph");
        assert_eq!(result.sequence_hash, s.sequence_hash());
    }

    #[test]
    fn test_feasible_is_scored() {
        let ctx = context(1000.0);
        let s = seq(vec![ActionCandidate::buy("MSFT", 1, 500.0, 500.0).unwrap()]);
        let result = evaluate_sequence(&s, &ctx, "ph", None);

        assert!(result.feasible);
        assert!((0.0..=1.0).contains(&result.score));
        assert_eq!(result.end_cash_eur, 500.0);
        assert_eq!(result.end_portfolio.position("MSFT"), 500.0);
    }

    #[test]
    fn test_evaluate_single_validates() {
        let ctx = context(1000.0);
        assert!(evaluate_single(&seq(vec![]), &ctx).unwrap_err().is_validation());

        let mut bad = context(1000.0);
        bad.costs.percent = -0.1;
        let s = seq(vec![ActionCandidate::buy("MSFT", 1, 5.0, 5.0).unwrap()]);
        assert!(evaluate_single(&s, &bad).unwrap_err().is_validation());
        assert!(evaluate_single(&s, &ctx).is_ok());
    }

    #[test]
    fn test_compare_ties_resolve_to_earliest() {
        let ctx = context(1000.0);
        let s = seq(vec![ActionCandidate::buy("MSFT", 1, 100.0, 100.0).unwrap()]);
        let infeasible = seq(vec![ActionCandidate::buy("MSFT", 1, 5000.0, 5000.0).unwrap()]);
        let results = vec![
            evaluate_sequence(&s, &ctx, "", None),
            evaluate_sequence(&infeasible, &ctx, "", None),
            evaluate_sequence(&s, &ctx, "", None),
        ];

        let cmp = compare_results(results);
        assert_eq!(cmp.best_index, Some(0));
        assert_eq!(cmp.worst_index, Some(1));
        assert_eq!(compare_results(vec![]).best_index, None);
    }
}
