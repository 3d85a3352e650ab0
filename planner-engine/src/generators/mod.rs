//! Pattern generators.
//!
//! Expand an [`OpportunityContext`] into candidate [`ActionSequence`]s:
//!
//! ```text
//! OpportunityContext
//!     │  rank each category by priority (desc, ties by symbol),
//!     │  drop disallowed sides, truncate to max_opportunities_per_category
//!     ▼
//! RankedOpportunities ──► enabled generators (one per PatternKind) ──► sequences
//! ```
//!
//! Generators never produce a sequence that touches the same symbol twice.
//! Different generators may produce the same sequence; deduplication is the
//! filter pipeline's job.

mod combinatorial;
mod patterns;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::model::{ActionCandidate, ActionSequence, OpportunityCategory, OpportunityContext, PatternKind, TradeSide};

// ============================================================================
// Settings
// ============================================================================

/// Parameters of the combinatorial generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombinatorialParams {
    /// Minimum priority for a candidate to be combined
    #[serde(default = "default_priority_threshold")]
    pub priority_threshold: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
}

fn default_priority_threshold() -> f64 {
    0.3
}

fn default_max_candidates() -> usize {
    12
}

fn default_max_combinations() -> usize {
    50
}

impl Default for CombinatorialParams {
    fn default() -> Self {
        Self {
            priority_threshold: default_priority_threshold(),
            max_candidates: default_max_candidates(),
            max_combinations: default_max_combinations(),
        }
    }
}

/// Parameters of the cost-optimized generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostOptimizedParams {
    /// Smallest trade worth its fixed cost, in EUR
    #[serde(default = "default_min_trade_value")]
    pub min_trade_value: f64,
}

fn default_min_trade_value() -> f64 {
    500.0
}

impl Default for CostOptimizedParams {
    fn default() -> Self {
        Self {
            min_trade_value: default_min_trade_value(),
        }
    }
}

/// Everything a generation pass needs besides the opportunities.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub max_depth: i64,
    pub max_opportunities_per_category: usize,
    pub enabled: Vec<PatternKind>,
    pub allow_buy: bool,
    pub allow_sell: bool,
    pub combinatorial: CombinatorialParams,
    pub cost_optimized: CostOptimizedParams,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_opportunities_per_category: 5,
            enabled: PatternKind::ALL.to_vec(),
            allow_buy: true,
            allow_sell: true,
            combinatorial: CombinatorialParams::default(),
            cost_optimized: CostOptimizedParams::default(),
        }
    }
}

// ============================================================================
// Ranked Opportunities
// ============================================================================

/// A tradeable action with the priority of the opportunity it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedAction {
    pub action: ActionCandidate,
    pub priority: f64,
}

fn by_priority(a: &RankedAction, b: &RankedAction) -> std::cmp::Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| a.action.symbol.cmp(&b.action.symbol))
}

fn by_value(a: &RankedAction, b: &RankedAction) -> std::cmp::Ordering {
    b.action
        .value_eur
        .total_cmp(&a.action.value_eur)
        .then_with(|| a.action.symbol.cmp(&b.action.symbol))
}

/// Opportunities ranked and truncated per category.
#[derive(Debug, Clone, Default)]
pub struct RankedOpportunities {
    categories: BTreeMap<OpportunityCategory, Vec<RankedAction>>,
    pub available_cash_eur: f64,
}

impl RankedOpportunities {
    pub fn new(context: &OpportunityContext, settings: &GenerationSettings) -> Self {
        let categories = OpportunityCategory::ALL
            .into_iter()
            .map(|category| {
                let mut ranked: Vec<RankedAction> = context
                    .category(category)
                    .iter()
                    .filter(|o| match o.side {
                        TradeSide::Buy => settings.allow_buy,
                        TradeSide::Sell => settings.allow_sell,
                    })
                    .filter_map(|o| {
                        o.to_action().map(|action| RankedAction {
                            action,
                            priority: o.priority,
                        })
                    })
                    .collect();
                ranked.sort_by(by_priority);
                ranked.truncate(settings.max_opportunities_per_category);
                (category, ranked)
            })
            .collect();

        Self {
            categories,
            available_cash_eur: context.available_cash_eur,
        }
    }

    pub fn category(&self, category: OpportunityCategory) -> &[RankedAction] {
        self.categories.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(Vec::is_empty)
    }

    /// Total ranked actions across categories. No sequence can be longer.
    pub fn action_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    fn side(&self, side: TradeSide, categories: &[OpportunityCategory]) -> Vec<&RankedAction> {
        let mut out: Vec<&RankedAction> = categories
            .iter()
            .flat_map(|c| self.category(*c))
            .filter(|r| r.action.side == side)
            .collect();
        out.sort_by(|a, b| by_priority(a, b));
        out
    }

    /// Every buy across categories, best first.
    pub fn buys(&self) -> Vec<&RankedAction> {
        self.side(TradeSide::Buy, &OpportunityCategory::ALL)
    }

    /// Every sell across categories, best first.
    pub fn sells(&self) -> Vec<&RankedAction> {
        self.side(TradeSide::Sell, &OpportunityCategory::ALL)
    }

    /// Buys from the given categories, best first.
    pub fn buys_in(&self, categories: &[OpportunityCategory]) -> Vec<&RankedAction> {
        self.side(TradeSide::Buy, categories)
    }

    /// Sells from the given categories, best first.
    pub fn sells_in(&self, categories: &[OpportunityCategory]) -> Vec<&RankedAction> {
        self.side(TradeSide::Sell, categories)
    }
}

/// Sort references by EUR value, largest first.
pub(crate) fn sort_by_value(actions: &mut [&RankedAction]) {
    actions.sort_by(|a, b| by_value(a, b));
}

// ============================================================================
// Sequence Drafts
// ============================================================================

/// A sequence under construction. Rejects a second action on the same symbol.
#[derive(Debug, Clone, Default)]
pub(crate) struct Draft {
    actions: Vec<ActionCandidate>,
    priority_sum: f64,
    symbols: HashSet<String>,
}

impl Draft {
    /// Append `ranked` unless its symbol is already present.
    pub fn push(&mut self, ranked: &RankedAction) -> bool {
        if !self.symbols.insert(ranked.action.symbol.clone()) {
            return false;
        }
        self.actions.push(ranked.action.clone());
        self.priority_sum += ranked.priority;
        true
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Freeze into a sequence scored by mean priority.
    pub fn finish(&self, pattern: PatternKind) -> ActionSequence {
        let score = if self.actions.is_empty() {
            0.0
        } else {
            self.priority_sum / self.actions.len() as f64
        };
        ActionSequence::scored(self.actions.clone(), pattern, score)
    }
}

/// One sequence per length `1..=max_depth`, each the prefix of `candidates`.
pub(crate) fn prefixes<'a>(
    pattern: PatternKind,
    candidates: impl IntoIterator<Item = &'a RankedAction>,
    max_depth: usize,
) -> Vec<ActionSequence> {
    let mut draft = Draft::default();
    let mut out = Vec::new();
    for candidate in candidates {
        if draft.len() >= max_depth {
            break;
        }
        if draft.push(candidate) {
            out.push(draft.finish(pattern));
        }
    }
    out
}

// ============================================================================
// Generation
// ============================================================================

/// Sequences from every enabled generator plus per-generator counts.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub sequences: Vec<ActionSequence>,
    pub per_pattern: BTreeMap<PatternKind, usize>,
}

impl GenerationOutput {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// Run one generator.
pub fn generate_pattern(
    pattern: PatternKind,
    ranked: &RankedOpportunities,
    settings: &GenerationSettings,
) -> Vec<ActionSequence> {
    let Ok(max_depth) = usize::try_from(settings.max_depth) else {
        return Vec::new();
    };
    let max_depth = max_depth.min(ranked.action_count());
    if max_depth == 0 {
        return Vec::new();
    }

    match pattern {
        PatternKind::DirectBuy => patterns::direct_buy(ranked, max_depth),
        PatternKind::ProfitTaking => patterns::profit_taking(ranked, max_depth),
        PatternKind::Rebalance => patterns::rebalance(ranked, max_depth),
        PatternKind::AveragingDown => patterns::averaging_down(ranked, max_depth),
        PatternKind::SingleBest => patterns::single_best(ranked),
        PatternKind::MultiSell => patterns::multi_sell(ranked, max_depth),
        PatternKind::MixedStrategy => patterns::mixed_strategy(ranked, max_depth),
        PatternKind::OpportunityFirst => patterns::opportunity_first(ranked, max_depth),
        PatternKind::DeepRebalance => patterns::deep_rebalance(ranked, max_depth),
        PatternKind::CashGeneration => patterns::cash_generation(ranked, max_depth),
        PatternKind::CostOptimized => {
            patterns::cost_optimized(ranked, max_depth, &settings.cost_optimized)
        }
        PatternKind::Combinatorial => {
            combinatorial::generate(ranked, max_depth, &settings.combinatorial)
        }
    }
}

/// Run every enabled generator.
///
/// `max_depth <= 0` or an empty opportunity context yields an empty output.
pub fn generate(context: &OpportunityContext, settings: &GenerationSettings) -> GenerationOutput {
    let mut output = GenerationOutput::default();
    if settings.max_depth <= 0 || context.is_empty() {
        debug!(max_depth = settings.max_depth, "Nothing to generate");
        return output;
    }

    let ranked = RankedOpportunities::new(context, settings);
    if ranked.is_empty() {
        return output;
    }

    for pattern in &settings.enabled {
        let sequences = generate_pattern(*pattern, &ranked, settings);
        debug!(pattern = %pattern, count = sequences.len(), "Generator finished");
        output.per_pattern.insert(*pattern, sequences.len());
        output.sequences.extend(sequences);
    }

    info!(
        total = output.sequences.len(),
        generators = settings.enabled.len(),
        "Sequence generation complete"
    );
    output
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Opportunity;
    use test_case::test_case;

    pub fn opp(symbol: &str, side: TradeSide, value: f64, priority: f64) -> Opportunity {
        Opportunity {
            symbol: symbol.into(),
            side,
            quantity: 1,
            price: value,
            value_eur: value,
            currency: "EUR".into(),
            priority,
            reason: String::new(),
        }
    }

    pub fn sample_context() -> OpportunityContext {
        OpportunityContext {
            profit_taking: vec![
                opp("AAPL", TradeSide::Sell, 800.0, 0.7),
                opp("NVDA", TradeSide::Sell, 1200.0, 0.9),
            ],
            averaging_down: vec![opp("INTC", TradeSide::Buy, 300.0, 0.5)],
            rebalance_buys: vec![opp("SAP", TradeSide::Buy, 600.0, 0.6)],
            rebalance_sells: vec![opp("TSLA", TradeSide::Sell, 700.0, 0.4)],
            opportunity_buys: vec![
                opp("MSFT", TradeSide::Buy, 900.0, 0.8),
                opp("ASML", TradeSide::Buy, 400.0, 0.35),
            ],
            weight_based: vec![opp("NESN", TradeSide::Buy, 250.0, 0.2)],
            available_cash_eur: 1000.0,
            total_portfolio_value_eur: 10_000.0,
            security_tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_zero_or_negative_depth_is_empty() {
        let ctx = sample_context();
        for depth in [0, -1] {
            let settings = GenerationSettings {
                max_depth: depth,
                ..Default::default()
            };
            assert!(generate(&ctx, &settings).is_empty());
        }
    }

    // sample_context ranks eight actions, three sells and five buys.
    #[test_case(0, 0 ; "zero depth")]
    #[test_case(1, 1 ; "single action")]
    #[test_case(8, 8 ; "depth equals action count")]
    #[test_case(1 << 40, 8 ; "depth far above action count")]
    fn test_depth_bounds(max_depth: i64, longest: usize) {
        let ctx = sample_context();
        let settings = GenerationSettings {
            max_depth,
            ..Default::default()
        };
        let ranked = RankedOpportunities::new(&ctx, &settings);
        assert_eq!(ranked.action_count(), 8);

        let output = generate(&ctx, &settings);
        let observed = output.sequences.iter().map(ActionSequence::len).max().unwrap_or(0);
        assert_eq!(observed, longest);
        assert_eq!(output.per_pattern.values().sum::<usize>(), output.len());

        if max_depth >= 8 {
            let at_count = generate(
                &ctx,
                &GenerationSettings {
                    max_depth: 8,
                    ..Default::default()
                },
            );
            assert_eq!(output.per_pattern, at_count.per_pattern);
            assert_eq!(output.per_pattern[&PatternKind::MixedStrategy], 8);
        }
    }

    #[test]
    fn test_empty_context_is_empty() {
        assert!(generate(&OpportunityContext::default(), &GenerationSettings::default()).is_empty());
    }

    #[test]
    fn test_ranking_and_truncation() {
        let mut ctx = sample_context();
        ctx.opportunity_buys.push(opp("AMZN", TradeSide::Buy, 100.0, 0.8));
        let settings = GenerationSettings {
            max_opportunities_per_category: 2,
            ..Default::default()
        };
        let ranked = RankedOpportunities::new(&ctx, &settings);
        let symbols: Vec<&str> = ranked
            .category(OpportunityCategory::OpportunityBuys)
            .iter()
            .map(|r| r.action.symbol.as_str())
            .collect();
        // Equal priority ties break by symbol.
        assert_eq!(symbols, vec!["AMZN", "MSFT"]);
    }

    #[test]
    fn test_disallowed_side_is_stripped() {
        let settings = GenerationSettings {
            allow_sell: false,
            ..Default::default()
        };
        let output = generate(&sample_context(), &settings);
        assert!(!output.is_empty());
        assert!(output
            .sequences
            .iter()
            .all(|s| s.actions().iter().all(|a| a.is_buy())));
    }

    #[test]
    fn test_sequences_respect_depth_and_unique_symbols() {
        let settings = GenerationSettings {
            max_depth: 3,
            ..Default::default()
        };
        let output = generate(&sample_context(), &settings);
        assert!(!output.is_empty());
        for sequence in &output.sequences {
            assert!((1..=3).contains(&sequence.len()));
            let symbols: HashSet<&str> = sequence.symbols().collect();
            assert_eq!(symbols.len(), sequence.len());
            assert!(sequence.pattern().is_some());
            assert!(sequence.score().is_some());
        }
        let counted: usize = output.per_pattern.values().sum();
        assert_eq!(counted, output.len());
    }

    #[test]
    fn test_only_enabled_generators_run() {
        let settings = GenerationSettings {
            enabled: vec![PatternKind::ProfitTaking],
            ..Default::default()
        };
        let output = generate(&sample_context(), &settings);
        assert_eq!(output.per_pattern.len(), 1);
        assert!(output
            .sequences
            .iter()
            .all(|s| s.pattern() == Some(PatternKind::ProfitTaking)));
    }
}
