//! End-state scoring and transaction costs.
//!
//! ```text
//! score = 0.55 · allocation      (diversification ⊕ optimizer alignment, by optimizer_blend)
//!       + 0.25 · expected return (relative to optimizer_target_return)
//!       + 0.10 · risk-adjusted   (quality-weighted)
//!       + 0.10 · quality
//!       − cost / total value · cost_penalty_factor
//! ```
//!
//! Every component is on a 0..1 scale; the final score is clamped to [0, 1].

use std::collections::BTreeMap;

use crate::model::{effective_value, ActionCandidate, PortfolioContext, PriceAdjustments, ScoringParams, TransactionCosts};

// ============================================================================
// Weights
// ============================================================================

const ALLOCATION_WEIGHT: f64 = 0.55;
const EXPECTED_RETURN_WEIGHT: f64 = 0.25;
const RISK_WEIGHT: f64 = 0.10;
const QUALITY_WEIGHT: f64 = 0.10;

const GEO_WEIGHT: f64 = 0.40;
const INDUSTRY_WEIGHT: f64 = 0.30;
const QUALITY_DIV_WEIGHT: f64 = 0.30;

/// Average deviation from target at which a diversification component scores 0.
const DEVIATION_SCALE: f64 = 0.30;
/// Average deviation from optimizer targets at which alignment scores 0.
const ALIGNMENT_SCALE: f64 = 0.20;

const NEUTRAL: f64 = 0.5;
const OTHER_GROUP: &str = "OTHER";

// ============================================================================
// Transaction Costs
// ============================================================================

/// Total transaction cost in EUR: per action `fixed + |value| · (percent + spread + slippage)`.
pub fn transaction_cost(
    sequence: &[ActionCandidate],
    costs: &TransactionCosts,
    adjustments: Option<&PriceAdjustments>,
) -> f64 {
    let variable_rate = costs.percent + costs.spread + costs.slippage;
    sequence
        .iter()
        .map(|a| costs.fixed + effective_value(a, adjustments).abs() * variable_rate)
        .sum()
}

// ============================================================================
// Diversification
// ============================================================================

fn average_deviation(
    portfolio: &PortfolioContext,
    targets: &BTreeMap<String, f64>,
    group_of: &BTreeMap<String, String>,
    total: f64,
) -> Option<f64> {
    if targets.is_empty() {
        return None;
    }

    let mut group_values: BTreeMap<&str, f64> = BTreeMap::new();
    for (symbol, value) in &portfolio.positions {
        let group = group_of.get(symbol).map_or(OTHER_GROUP, String::as_str);
        *group_values.entry(group).or_insert(0.0) += value;
    }

    let deviations: f64 = targets
        .iter()
        .map(|(group, target)| {
            let current = group_values.get(group.as_str()).copied().unwrap_or(0.0) / total;
            (current - target).abs()
        })
        .sum();

    Some(deviations / targets.len() as f64)
}

fn deviation_score(avg_deviation: Option<f64>) -> f64 {
    avg_deviation.map_or(NEUTRAL, |d| (1.0 - d / DEVIATION_SCALE).max(0.0))
}

/// Value-weighted average of a per-symbol metric, or `None` without coverage.
fn weighted_average(portfolio: &PortfolioContext, metric: &BTreeMap<String, f64>) -> Option<f64> {
    let (sum, weight) = portfolio
        .positions
        .iter()
        .filter_map(|(symbol, value)| metric.get(symbol).map(|m| (m * value, *value)))
        .fold((0.0, 0.0), |(s, w), (mv, v)| (s + mv, w + v));

    (weight > 0.0).then(|| sum / weight)
}

/// Geographic (40%), industry (30%) and quality/dividend (30%) diversification.
pub fn diversification_score(portfolio: &PortfolioContext) -> f64 {
    let total = portfolio.positions_value();
    if total <= 0.0 {
        return NEUTRAL;
    }

    let geo = deviation_score(average_deviation(
        portfolio,
        &portfolio.country_weights,
        &portfolio.security_countries,
        total,
    ));
    let industry = deviation_score(average_deviation(
        portfolio,
        &portfolio.industry_weights,
        &portfolio.security_industries,
        total,
    ));

    let quality = weighted_average(portfolio, &portfolio.security_scores).unwrap_or(NEUTRAL);
    let dividend = weighted_average(portfolio, &portfolio.dividend_yields)
        .map_or(NEUTRAL, |y| (y * 10.0).min(1.0));
    let quality_dividend = quality * 0.6 + dividend * 0.4;

    (geo * GEO_WEIGHT + industry * INDUSTRY_WEIGHT + quality_dividend * QUALITY_DIV_WEIGHT).min(1.0)
}

/// Closeness of current weights to optimizer targets.
pub fn optimizer_alignment(portfolio: &PortfolioContext) -> f64 {
    let total = portfolio.positions_value();
    if portfolio.optimizer_target_weights.is_empty() || total <= 0.0 {
        return NEUTRAL;
    }

    let deviation: f64 = portfolio
        .optimizer_target_weights
        .iter()
        .map(|(symbol, target)| (portfolio.position(symbol) / total - target).abs())
        .sum::<f64>()
        / portfolio.optimizer_target_weights.len() as f64;

    (1.0 - deviation / ALIGNMENT_SCALE).max(0.0)
}

/// Growth plus dividend return relative to the target return.
///
/// On-target return scores 0.6; the score saturates at 1.0.
pub fn expected_return_score(portfolio: &PortfolioContext, target_return: f64) -> f64 {
    let growth = weighted_average(portfolio, &portfolio.expected_returns);
    let dividend = weighted_average(portfolio, &portfolio.dividend_yields);
    if growth.is_none() && dividend.is_none() {
        return NEUTRAL;
    }
    if target_return <= 0.0 {
        return 1.0;
    }

    let total_return = growth.unwrap_or(0.0) + dividend.unwrap_or(0.0);
    (0.6 * total_return / target_return).clamp(0.0, 1.0)
}

/// Risk proxy: quality-weighted, penalising concentration in the largest position.
pub fn risk_adjusted_score(portfolio: &PortfolioContext) -> f64 {
    let total = portfolio.positions_value();
    if total <= 0.0 {
        return NEUTRAL;
    }

    let quality = weighted_average(portfolio, &portfolio.security_scores).unwrap_or(NEUTRAL);
    let largest = portfolio.positions.values().cloned().fold(0.0, f64::max) / total;
    // A single position above 25% starts to cost.
    let concentration_penalty = ((largest - 0.25) / 0.75).clamp(0.0, 1.0);

    (quality * (1.0 - 0.5 * concentration_penalty)).clamp(0.0, 1.0)
}

/// Value-weighted security quality.
pub fn quality_score(portfolio: &PortfolioContext) -> f64 {
    weighted_average(portfolio, &portfolio.security_scores).unwrap_or(NEUTRAL)
}

// ============================================================================
// End State
// ============================================================================

/// Score a simulated end state, net of the sequence's transaction cost.
pub fn evaluate_end_state(end: &PortfolioContext, total_cost: f64, params: &ScoringParams) -> f64 {
    let blend = params.optimizer_blend;
    let allocation = diversification_score(end) * (1.0 - blend) + optimizer_alignment(end) * blend;

    let mut score = allocation * ALLOCATION_WEIGHT
        + expected_return_score(end, params.optimizer_target_return) * EXPECTED_RETURN_WEIGHT
        + risk_adjusted_score(end) * RISK_WEIGHT
        + quality_score(end) * QUALITY_WEIGHT;

    let total_value = if end.total_value > 0.0 {
        end.total_value
    } else {
        end.positions_value()
    };
    if params.cost_penalty_factor > 0.0 && total_value > 0.0 {
        score -= total_cost / total_value * params.cost_penalty_factor;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portfolio(entries: &[(&str, f64, &str)]) -> PortfolioContext {
        let mut p = PortfolioContext::default();
        for (symbol, value, country) in entries {
            p.positions.insert(symbol.to_string(), *value);
            p.security_countries.insert(symbol.to_string(), country.to_string());
        }
        p.total_value = p.positions_value();
        p
    }

    #[test]
    fn test_transaction_cost() {
        let seq = [
            ActionCandidate::buy("A", 1, 1000.0, 1000.0).unwrap(),
            ActionCandidate::sell("B", 1, 500.0, 500.0).unwrap(),
        ];
        let costs = TransactionCosts {
            fixed: 2.0,
            percent: 0.002,
            spread: 0.0,
            slippage: 0.0,
        };
        let cost = transaction_cost(&seq, &costs, None);
        assert!((cost - (2.0 + 2.0 + 1500.0 * 0.002)).abs() < 1e-9);
        assert_eq!(transaction_cost(&seq, &TransactionCosts::zero(), None), 0.0);
    }

    #[test]
    fn test_empty_portfolio_is_neutral() {
        let empty = PortfolioContext::default();
        assert_eq!(diversification_score(&empty), NEUTRAL);
        assert_eq!(optimizer_alignment(&empty), NEUTRAL);
    }

    #[test]
    fn test_geo_alignment_improves_score() {
        let mut aligned = portfolio(&[("A", 500.0, "US"), ("B", 500.0, "EU")]);
        aligned.country_weights.insert("US".into(), 0.5);
        aligned.country_weights.insert("EU".into(), 0.5);

        let mut skewed = portfolio(&[("A", 950.0, "US"), ("B", 50.0, "EU")]);
        skewed.country_weights = aligned.country_weights.clone();

        assert!(diversification_score(&aligned) > diversification_score(&skewed));
    }

    #[test]
    fn test_expected_return_relative_to_target() {
        let mut p = portfolio(&[("A", 1000.0, "US")]);
        p.expected_returns.insert("A".into(), 0.11);
        assert!((expected_return_score(&p, 0.11) - 0.6).abs() < 1e-9);
        p.expected_returns.insert("A".into(), 0.5);
        assert_eq!(expected_return_score(&p, 0.11), 1.0);
    }

    #[test]
    fn test_cost_penalty_lowers_score() {
        let p = portfolio(&[("A", 1000.0, "US"), ("B", 1000.0, "EU")]);
        let params = ScoringParams::default();
        let free = evaluate_end_state(&p, 0.0, &params);
        let costly = evaluate_end_state(&p, 200.0, &params);
        assert!(costly < free);
        assert!((free - costly - 200.0 / 2000.0 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        let p = portfolio(&[("A", 10.0, "US")]);
        let params = ScoringParams {
            cost_penalty_factor: 10.0,
            ..Default::default()
        };
        assert_eq!(evaluate_end_state(&p, 1_000_000.0, &params), 0.0);
        let s = evaluate_end_state(&p, 0.0, &ScoringParams::default());
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn test_concentration_penalised() {
        let mut balanced = portfolio(&[("A", 250.0, "US"), ("B", 250.0, "US"), ("C", 250.0, "US"), ("D", 250.0, "US")]);
        let mut concentrated = portfolio(&[("A", 900.0, "US"), ("B", 100.0, "US")]);
        for p in [&mut balanced, &mut concentrated] {
            for symbol in p.positions.keys().cloned().collect::<Vec<_>>() {
                p.security_scores.insert(symbol, 0.8);
            }
        }
        assert!(risk_adjusted_score(&balanced) > risk_adjusted_score(&concentrated));
    }
}
