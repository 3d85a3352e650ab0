//! Generator pattern identifiers.

use planner_common::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The closed set of sequence generators.
///
/// Declaration order is generator priority: when two candidate plans tie on
/// score and transaction cost, the one produced by the earlier pattern wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Affordable buys in priority order
    DirectBuy,
    /// Sells of positions flagged for profit taking
    ProfitTaking,
    /// Rebalance sells followed by rebalance buys
    Rebalance,
    /// Buys that average down existing positions
    AveragingDown,
    /// The single strongest opportunity on its own
    SingleBest,
    /// Several sells together
    MultiSell,
    /// Top sells funding top buys
    MixedStrategy,
    /// Best opportunity buy, funded by sells when cash is short
    OpportunityFirst,
    /// Interleaved rebalance sell/buy pairs
    DeepRebalance,
    /// Largest sells first
    CashGeneration,
    /// Few, large trades only
    CostOptimized,
    /// Bounded sells-then-buys combinations
    Combinatorial,
}

impl PatternKind {
    /// All patterns in priority order.
    pub const ALL: [PatternKind; 12] = [
        Self::DirectBuy,
        Self::ProfitTaking,
        Self::Rebalance,
        Self::AveragingDown,
        Self::SingleBest,
        Self::MultiSell,
        Self::MixedStrategy,
        Self::OpportunityFirst,
        Self::DeepRebalance,
        Self::CashGeneration,
        Self::CostOptimized,
        Self::Combinatorial,
    ];

    /// Configuration name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DirectBuy => "direct_buy",
            Self::ProfitTaking => "profit_taking",
            Self::Rebalance => "rebalance",
            Self::AveragingDown => "averaging_down",
            Self::SingleBest => "single_best",
            Self::MultiSell => "multi_sell",
            Self::MixedStrategy => "mixed_strategy",
            Self::OpportunityFirst => "opportunity_first",
            Self::DeepRebalance => "deep_rebalance",
            Self::CashGeneration => "cash_generation",
            Self::CostOptimized => "cost_optimized",
            Self::Combinatorial => "combinatorial",
        }
    }

    /// Tie-break rank, lower is preferred.
    pub fn priority(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(Self::ALL.len())
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown generator '{s}'")))
    }
}
