//! Categorized trading opportunities, the generators' input.

use planner_common::validation::{collect_errors, ensure_non_negative, Validate, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::action::{ActionCandidate, TradeSide};

/// A single identified opportunity with its attractiveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: u64,
    pub price: f64,
    pub value_eur: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Priority/attractiveness, higher is better
    #[serde(default)]
    pub priority: f64,
    #[serde(default)]
    pub reason: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

impl Opportunity {
    /// Convert to an action, or `None` if the opportunity is not tradeable.
    pub fn to_action(&self) -> Option<ActionCandidate> {
        ActionCandidate::new(
            self.symbol.clone(),
            self.side,
            self.quantity,
            self.price,
            self.value_eur,
            self.currency.clone(),
        )
        .ok()
    }
}

/// Opportunity category, one list per category in [`OpportunityContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityCategory {
    ProfitTaking,
    AveragingDown,
    RebalanceBuys,
    RebalanceSells,
    OpportunityBuys,
    WeightBased,
}

impl OpportunityCategory {
    pub const ALL: [OpportunityCategory; 6] = [
        Self::ProfitTaking,
        Self::AveragingDown,
        Self::RebalanceBuys,
        Self::RebalanceSells,
        Self::OpportunityBuys,
        Self::WeightBased,
    ];
}

/// Opportunities grouped by category, plus the cash/value they were sized against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityContext {
    #[serde(default)]
    pub profit_taking: Vec<Opportunity>,
    #[serde(default)]
    pub averaging_down: Vec<Opportunity>,
    #[serde(default)]
    pub rebalance_buys: Vec<Opportunity>,
    #[serde(default)]
    pub rebalance_sells: Vec<Opportunity>,
    #[serde(default)]
    pub opportunity_buys: Vec<Opportunity>,
    #[serde(default)]
    pub weight_based: Vec<Opportunity>,
    #[serde(default)]
    pub available_cash_eur: f64,
    #[serde(default)]
    pub total_portfolio_value_eur: f64,
    /// symbol → tags, consumed by the tag filter
    #[serde(default)]
    pub security_tags: BTreeMap<String, Vec<String>>,
}

impl Validate for OpportunityContext {
    fn validate(&self) -> ValidationResult<()> {
        let errors = [
            ensure_non_negative("opportunities.available_cash_eur", self.available_cash_eur),
            ensure_non_negative("opportunities.total_portfolio_value_eur", self.total_portfolio_value_eur),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect();
        collect_errors(errors)
    }
}

impl OpportunityContext {
    pub fn category(&self, category: OpportunityCategory) -> &[Opportunity] {
        match category {
            OpportunityCategory::ProfitTaking => &self.profit_taking,
            OpportunityCategory::AveragingDown => &self.averaging_down,
            OpportunityCategory::RebalanceBuys => &self.rebalance_buys,
            OpportunityCategory::RebalanceSells => &self.rebalance_sells,
            OpportunityCategory::OpportunityBuys => &self.opportunity_buys,
            OpportunityCategory::WeightBased => &self.weight_based,
        }
    }

    /// Iterate every opportunity with its category.
    pub fn all(&self) -> impl Iterator<Item = (OpportunityCategory, &Opportunity)> {
        OpportunityCategory::ALL
            .into_iter()
            .flat_map(move |c| self.category(c).iter().map(move |o| (c, o)))
    }

    pub fn len(&self) -> usize {
        OpportunityCategory::ALL
            .iter()
            .map(|c| self.category(*c).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tags_of(&self, symbol: &str) -> &[String] {
        self.security_tags
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
