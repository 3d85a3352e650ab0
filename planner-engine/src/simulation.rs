//! Simulation core.
//!
//! Pure functions over copies of state: nothing here mutates its inputs,
//! touches I/O, or allocates shared resources, so every worker can call
//! them concurrently on the same read-only snapshot.
//!
//! ```text
//!   sequence ──► check_sequence_feasibility ──► (prefix-sum cash walk)
//!      │
//!      ├─────► simulate_sequence ─────────────► end portfolio + end cash
//!      │
//!      └─────► calculate_sequence_cash_flow ──► generated / required / net
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

use crate::model::{
    effective_value, ActionCandidate, PortfolioContext, PriceAdjustments, SecurityMeta, TradeSide,
};

/// Positions at or below this EUR value are removed after a sell.
pub const POSITION_EPSILON: f64 = 0.01;

// ============================================================================
// Simulation
// ============================================================================

/// End state of a simulated sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub end_portfolio: PortfolioContext,
    pub end_cash_eur: f64,
    /// Actions applied
    pub executed: usize,
    /// Buys skipped because cash did not cover them
    pub skipped: usize,
}

/// Apply `sequence` to a copy of the starting state, strictly in order.
///
/// - BUY: applied only if the running cash covers the full value; otherwise
///   the action is skipped entirely. Country and industry metadata are
///   recorded the first time a symbol is acquired.
/// - SELL: adds the value to cash and reduces the position; a position left
///   at or below [`POSITION_EPSILON`] is removed from the map.
///
/// Missing security metadata is not an error; enrichment is skipped.
pub fn simulate_sequence(
    sequence: &[ActionCandidate],
    start_portfolio: &PortfolioContext,
    start_cash: f64,
    security_meta: &BTreeMap<String, SecurityMeta>,
    price_adjustments: Option<&PriceAdjustments>,
) -> SimulationOutcome {
    let mut portfolio = start_portfolio.clone();
    let mut cash = start_cash;
    let mut executed = 0;
    let mut skipped = 0;

    for action in sequence {
        let value = effective_value(action, price_adjustments);

        match action.side {
            TradeSide::Buy => {
                if cash < value {
                    trace!(symbol = %action.symbol, value, cash, "Skipping unaffordable buy");
                    skipped += 1;
                    continue;
                }

                cash -= value;
                let is_new = !portfolio.positions.contains_key(&action.symbol);
                *portfolio.positions.entry(action.symbol.clone()).or_insert(0.0) += value;

                if is_new {
                    record_metadata(&mut portfolio, &action.symbol, security_meta);
                }
            }
            TradeSide::Sell => {
                cash += value;
                let held = portfolio.position(&action.symbol);
                let removed = value.min(held);
                let remaining = held - removed;

                if remaining <= POSITION_EPSILON {
                    portfolio.positions.remove(&action.symbol);
                } else {
                    portfolio.positions.insert(action.symbol.clone(), remaining);
                }

                // Proceeds beyond the held value enter as fresh cash.
                portfolio.total_value += value - removed;
            }
        }
        executed += 1;
    }

    SimulationOutcome {
        end_portfolio: portfolio,
        end_cash_eur: cash,
        executed,
        skipped,
    }
}

fn record_metadata(
    portfolio: &mut PortfolioContext,
    symbol: &str,
    security_meta: &BTreeMap<String, SecurityMeta>,
) {
    let Some(meta) = security_meta.get(symbol) else {
        trace!(symbol, "No security metadata, skipping enrichment");
        return;
    };

    if let Some(country) = &meta.country {
        portfolio
            .security_countries
            .entry(symbol.to_string())
            .or_insert_with(|| country.clone());
    }
    if let Some(industry) = &meta.industry {
        portfolio
            .security_industries
            .entry(symbol.to_string())
            .or_insert_with(|| industry.clone());
    }
}

// ============================================================================
// Feasibility
// ============================================================================

/// Whether the sequence can run without cash ever going negative.
///
/// Walks the sequence with a running balance (SELL adds, BUY subtracts) and
/// fails at the first prefix that goes below zero. A sell only funds buys
/// that come after it.
pub fn check_sequence_feasibility(
    sequence: &[ActionCandidate],
    start_cash: f64,
    price_adjustments: Option<&PriceAdjustments>,
) -> bool {
    let mut cash = start_cash;

    for action in sequence {
        let value = effective_value(action, price_adjustments);
        match action.side {
            TradeSide::Sell => cash += value,
            TradeSide::Buy => {
                cash -= value;
                if cash < 0.0 {
                    return false;
                }
            }
        }
    }

    true
}

// ============================================================================
// Cash Flow
// ============================================================================

/// Aggregate cash movement of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CashFlowSummary {
    /// Sum of SELL values
    pub cash_generated: f64,
    /// Sum of BUY values
    pub cash_required: f64,
    /// `cash_generated - cash_required`
    pub net_cash_flow: f64,
}

/// Cheap, order-independent cash summary used for pre-filtering.
pub fn calculate_sequence_cash_flow(sequence: &[ActionCandidate]) -> CashFlowSummary {
    let (generated, required) = sequence.iter().fold((0.0, 0.0), |(g, r), a| match a.side {
        TradeSide::Sell => (g + a.value_eur, r),
        TradeSide::Buy => (g, r + a.value_eur),
    });

    CashFlowSummary {
        cash_generated: generated,
        cash_required: required,
        net_cash_flow: generated - required,
    }
}

/// A sequence whose final balance is negative can never be feasible.
pub fn cannot_be_feasible(sequence: &[ActionCandidate], start_cash: f64) -> bool {
    start_cash + calculate_sequence_cash_flow(sequence).net_cash_flow < 0.0
}
