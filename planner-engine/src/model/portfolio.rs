//! Portfolio snapshots and evaluation contexts.

use planner_common::validation::{
    collect_errors, ensure_fraction, ensure_non_negative, Validate, ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::action::ActionCandidate;

// ============================================================================
// Portfolio Context
// ============================================================================

/// Snapshot of a portfolio. Read-only during a planning cycle; simulation
/// always works on a private copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioContext {
    /// symbol → position value in EUR
    #[serde(default)]
    pub positions: BTreeMap<String, f64>,
    #[serde(default)]
    pub total_value: f64,
    /// Target weight per country group
    #[serde(default)]
    pub country_weights: BTreeMap<String, f64>,
    /// Target weight per industry
    #[serde(default)]
    pub industry_weights: BTreeMap<String, f64>,
    /// symbol → country
    #[serde(default)]
    pub security_countries: BTreeMap<String, String>,
    /// symbol → industry
    #[serde(default)]
    pub security_industries: BTreeMap<String, String>,
    /// symbol → quality score in [0, 1]
    #[serde(default)]
    pub security_scores: BTreeMap<String, f64>,
    /// symbol → dividend yield as a fraction
    #[serde(default)]
    pub dividend_yields: BTreeMap<String, f64>,
    /// symbol → expected annual growth as a fraction
    #[serde(default)]
    pub expected_returns: BTreeMap<String, f64>,
    /// symbol → optimizer target weight
    #[serde(default)]
    pub optimizer_target_weights: BTreeMap<String, f64>,
}

impl Validate for PortfolioContext {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if let Err(e) = ensure_non_negative("portfolio.total_value", self.total_value) {
            errors.push(e);
        }
        for (symbol, value) in &self.positions {
            if let Err(e) = ensure_non_negative(&format!("portfolio.positions.{symbol}"), *value) {
                errors.push(e);
            }
        }
        collect_errors(errors)
    }
}

impl PortfolioContext {
    /// Sum of position values.
    pub fn positions_value(&self) -> f64 {
        self.positions.values().sum()
    }

    pub fn position(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn country_of(&self, symbol: &str) -> Option<&str> {
        self.security_countries.get(symbol).map(String::as_str)
    }

    pub fn industry_of(&self, symbol: &str) -> Option<&str> {
        self.security_industries.get(symbol).map(String::as_str)
    }
}

/// Country/industry metadata for a security.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityMeta {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

// ============================================================================
// Price Adjustments
// ============================================================================

/// What-if price and currency overrides.
///
/// Adjustments are applied to an action's native-currency value before it is
/// converted to EUR. Without adjustments the action's precomputed `value_eur`
/// is used unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAdjustments {
    /// symbol → price multiplier
    #[serde(default)]
    pub price_multipliers: BTreeMap<String, f64>,
    /// Multiplier applied to every symbol, on top of per-symbol multipliers
    #[serde(default = "default_multiplier")]
    pub global_multiplier: f64,
    /// currency → EUR per unit of currency
    #[serde(default)]
    pub fx_rates: BTreeMap<String, f64>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for PriceAdjustments {
    fn default() -> Self {
        Self {
            price_multipliers: BTreeMap::new(),
            global_multiplier: default_multiplier(),
            fx_rates: BTreeMap::new(),
        }
    }
}

impl PriceAdjustments {
    /// Uniform shift of every price, e.g. `-0.1` for a 10% drop.
    pub fn uniform_shift(shift: f64) -> Self {
        Self {
            global_multiplier: 1.0 + shift,
            ..Self::default()
        }
    }

    /// EUR value of `action` under these adjustments.
    pub fn value_eur(&self, action: &ActionCandidate) -> f64 {
        let multiplier = self
            .price_multipliers
            .get(&action.symbol)
            .copied()
            .unwrap_or(1.0)
            * self.global_multiplier;

        let native = action.quantity as f64 * action.price;
        if native <= 0.0 {
            return action.value_eur * multiplier;
        }

        let rate = match self.fx_rates.get(&action.currency) {
            Some(rate) => *rate,
            None if action.currency == "EUR" => 1.0,
            // Fall back to the rate implied by the precomputed EUR value.
            None => action.value_eur / native,
        };

        native * multiplier * rate
    }
}

impl Validate for PriceAdjustments {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if let Err(e) = ensure_non_negative("price_adjustments.global_multiplier", self.global_multiplier) {
            errors.push(e);
        }
        for (symbol, m) in &self.price_multipliers {
            if let Err(e) = ensure_non_negative(&format!("price_adjustments.price_multipliers.{symbol}"), *m) {
                errors.push(e);
            }
        }
        for (currency, rate) in &self.fx_rates {
            if let Err(e) = ensure_non_negative(&format!("price_adjustments.fx_rates.{currency}"), *rate) {
                errors.push(e);
            }
        }
        collect_errors(errors)
    }
}

/// EUR value of an action, honouring optional adjustments. Never negative.
pub fn effective_value(action: &ActionCandidate, adjustments: Option<&PriceAdjustments>) -> f64 {
    adjustments
        .map_or(action.value_eur(), |adj| adj.value_eur(action))
        .max(0.0)
}

// ============================================================================
// Cost and Scoring Parameters
// ============================================================================

/// Transaction cost model, applied per action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionCosts {
    /// Fixed cost per trade in EUR
    #[serde(default = "default_cost_fixed")]
    pub fixed: f64,
    /// Variable cost as a fraction of trade value
    #[serde(default = "default_cost_percent")]
    pub percent: f64,
    /// Bid-ask spread as a fraction of trade value
    #[serde(default = "default_spread")]
    pub spread: f64,
    /// Slippage as a fraction of trade value
    #[serde(default = "default_slippage")]
    pub slippage: f64,
}

fn default_cost_fixed() -> f64 {
    5.0
}

fn default_cost_percent() -> f64 {
    0.001
}

fn default_spread() -> f64 {
    0.001
}

fn default_slippage() -> f64 {
    0.0015
}

impl Default for TransactionCosts {
    fn default() -> Self {
        Self {
            fixed: default_cost_fixed(),
            percent: default_cost_percent(),
            spread: default_spread(),
            slippage: default_slippage(),
        }
    }
}

impl TransactionCosts {
    /// No costs at all.
    pub const fn zero() -> Self {
        Self {
            fixed: 0.0,
            percent: 0.0,
            spread: 0.0,
            slippage: 0.0,
        }
    }
}

impl Validate for TransactionCosts {
    fn validate(&self) -> ValidationResult<()> {
        let errors = [
            ensure_non_negative("transaction_costs.fixed", self.fixed),
            ensure_non_negative("transaction_costs.percent", self.percent),
            ensure_non_negative("transaction_costs.spread", self.spread),
            ensure_non_negative("transaction_costs.slippage", self.slippage),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect();
        collect_errors(errors)
    }
}

/// End-state scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Weight of the subtractive transaction cost penalty
    #[serde(default = "default_cost_penalty_factor")]
    pub cost_penalty_factor: f64,
    /// Annual return considered on target
    #[serde(default = "default_optimizer_target_return")]
    pub optimizer_target_return: f64,
    /// Share of the allocation score taken from optimizer alignment
    #[serde(default = "default_optimizer_blend")]
    pub optimizer_blend: f64,
}

fn default_cost_penalty_factor() -> f64 {
    0.1
}

fn default_optimizer_target_return() -> f64 {
    0.11
}

fn default_optimizer_blend() -> f64 {
    0.45
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            cost_penalty_factor: default_cost_penalty_factor(),
            optimizer_target_return: default_optimizer_target_return(),
            optimizer_blend: default_optimizer_blend(),
        }
    }
}

impl Validate for ScoringParams {
    fn validate(&self) -> ValidationResult<()> {
        ensure_non_negative("cost_penalty_factor", self.cost_penalty_factor)?;
        ensure_non_negative("optimizer_target_return", self.optimizer_target_return)?;
        ensure_fraction("optimizer_blend", self.optimizer_blend)
    }
}

// ============================================================================
// Evaluation Context
// ============================================================================

/// Starting state for one sequence evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(alias = "available_cash")]
    pub available_cash_eur: f64,
    #[serde(alias = "portfolio_context")]
    pub portfolio: PortfolioContext,
    #[serde(default)]
    pub security_meta: BTreeMap<String, SecurityMeta>,
    #[serde(default)]
    pub costs: TransactionCosts,
    #[serde(default)]
    pub scoring: ScoringParams,
}

impl EvaluationContext {
    pub fn new(available_cash_eur: f64, portfolio: PortfolioContext) -> Self {
        Self {
            available_cash_eur,
            portfolio,
            ..Self::default()
        }
    }

    pub fn with_costs(mut self, costs: TransactionCosts) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_security_meta(mut self, meta: BTreeMap<String, SecurityMeta>) -> Self {
        self.security_meta = meta;
        self
    }
}

impl Validate for EvaluationContext {
    fn validate(&self) -> ValidationResult<()> {
        let errors = [
            ensure_non_negative("context.available_cash_eur", self.available_cash_eur),
            self.portfolio.validate(),
            self.costs.validate(),
            self.scoring.validate(),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect();
        collect_errors(errors)
    }
}
