//! Evaluation and simulation results.

use serde::{Deserialize, Serialize};

use super::pattern::PatternKind;
use super::portfolio::PortfolioContext;

/// Outcome of simulating and scoring one sequence.
///
/// An infeasible sequence is not an error: it is reported with
/// `feasible = false`, a score of zero and the unchanged starting state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub sequence_hash: String,
    pub portfolio_hash: String,
    #[serde(default)]
    pub pattern: Option<PatternKind>,
    pub feasible: bool,
    pub score: f64,
    pub end_cash_eur: f64,
    pub end_portfolio: PortfolioContext,
    pub transaction_costs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// End state of a simulated sequence, without scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub sequence_hash: String,
    pub end_cash_eur: f64,
    pub end_portfolio: PortfolioContext,
    /// Actions applied
    pub executed: usize,
    /// Buys skipped for lack of cash
    pub skipped: usize,
}
