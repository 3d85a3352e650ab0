//! Heuristic generators. Each emits at most one sequence per length.

use super::{prefixes, sort_by_value, CostOptimizedParams, Draft, RankedAction, RankedOpportunities};
use crate::model::{ActionSequence, OpportunityCategory as Cat, PatternKind};

/// Buys in priority order, skipping any that would exceed available cash.
pub(super) fn direct_buy(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    let mut remaining = ranked.available_cash_eur;
    let affordable: Vec<&RankedAction> = ranked
        .buys()
        .into_iter()
        .filter(|r| {
            if r.action.value_eur <= remaining {
                remaining -= r.action.value_eur;
                true
            } else {
                false
            }
        })
        .collect();
    prefixes(PatternKind::DirectBuy, affordable, max_depth)
}

pub(super) fn profit_taking(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    prefixes(PatternKind::ProfitTaking, ranked.sells_in(&[Cat::ProfitTaking]), max_depth)
}

/// Rebalance sells first, their proceeds then fund rebalance buys.
pub(super) fn rebalance(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    let chain = ranked
        .sells_in(&[Cat::RebalanceSells])
        .into_iter()
        .chain(ranked.buys_in(&[Cat::RebalanceBuys]));
    prefixes(PatternKind::Rebalance, chain, max_depth)
}

pub(super) fn averaging_down(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    prefixes(PatternKind::AveragingDown, ranked.buys_in(&[Cat::AveragingDown]), max_depth)
}

/// Single actions: the best overall, the best buy and the best sell.
pub(super) fn single_best(ranked: &RankedOpportunities) -> Vec<ActionSequence> {
    let best_buy = ranked.buys().into_iter().next();
    let best_sell = ranked.sells().into_iter().next();
    let best_overall = match (best_buy, best_sell) {
        (Some(b), Some(s)) if s.priority > b.priority => Some(s),
        (Some(b), _) => Some(b),
        (None, s) => s,
    };

    let mut out: Vec<ActionSequence> = Vec::new();
    for candidate in [best_overall, best_buy, best_sell].into_iter().flatten() {
        let mut draft = Draft::default();
        draft.push(candidate);
        let sequence = draft.finish(PatternKind::SingleBest);
        if !out.iter().any(|s| s.sequence_hash() == sequence.sequence_hash()) {
            out.push(sequence);
        }
    }
    out
}

/// Two or more sells together.
pub(super) fn multi_sell(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    prefixes(PatternKind::MultiSell, ranked.sells(), max_depth)
        .into_iter()
        .filter(|s| s.len() >= 2)
        .collect()
}

/// `floor(d/2)` sells followed by buys, for each length `d`.
pub(super) fn mixed_strategy(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    let sells = ranked.sells();
    let buys = ranked.buys();
    let longest = max_depth.min(sells.len() + buys.len());

    (1..=longest)
        .filter_map(|depth| {
            let sell_count = depth / 2;
            let mut draft = Draft::default();
            for sell in sells.iter().take(sell_count) {
                draft.push(sell);
            }
            for buy in &buys {
                if draft.len() >= depth {
                    break;
                }
                draft.push(buy);
            }
            (draft.len() == depth).then(|| draft.finish(PatternKind::MixedStrategy))
        })
        .collect()
}

/// The top opportunity buy, preceded by the largest sells needed to fund it.
pub(super) fn opportunity_first(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    let buys = ranked.buys_in(&[Cat::OpportunityBuys]);
    let Some(top) = buys.first() else {
        return Vec::new();
    };

    let mut funding = Draft::default();
    let mut cash = ranked.available_cash_eur;
    if cash < top.action.value_eur {
        let mut sells = ranked.sells();
        sort_by_value(&mut sells);
        for sell in sells {
            if cash >= top.action.value_eur {
                break;
            }
            if sell.action.symbol != top.action.symbol && funding.push(sell) {
                cash += sell.action.value_eur;
            }
        }
        if cash < top.action.value_eur {
            return Vec::new();
        }
    }

    let mut draft = funding;
    let mut out = Vec::new();
    for buy in buys {
        if draft.len() >= max_depth {
            break;
        }
        if draft.push(buy) {
            out.push(draft.finish(PatternKind::OpportunityFirst));
        }
    }
    out
}

/// Interleaved sell/buy pairs from rebalance and weight-based opportunities.
pub(super) fn deep_rebalance(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    let sells = ranked.sells_in(&[Cat::RebalanceSells, Cat::WeightBased]);
    let buys = ranked.buys_in(&[Cat::RebalanceBuys, Cat::WeightBased]);

    let mut interleaved = Vec::with_capacity(sells.len() + buys.len());
    let mut sells = sells.into_iter();
    let mut buys = buys.into_iter();
    loop {
        let sell = sells.next();
        let buy = buys.next();
        if sell.is_none() && buy.is_none() {
            break;
        }
        interleaved.extend(sell);
        interleaved.extend(buy);
    }

    prefixes(PatternKind::DeepRebalance, interleaved, max_depth)
}

/// Largest sells first.
pub(super) fn cash_generation(ranked: &RankedOpportunities, max_depth: usize) -> Vec<ActionSequence> {
    let mut sells = ranked.sells();
    sort_by_value(&mut sells);
    prefixes(PatternKind::CashGeneration, sells, max_depth)
}

/// Only trades large enough to absorb their fixed cost, sells before buys.
pub(super) fn cost_optimized(
    ranked: &RankedOpportunities,
    max_depth: usize,
    params: &CostOptimizedParams,
) -> Vec<ActionSequence> {
    let large = |r: &&RankedAction| r.action.value_eur >= params.min_trade_value;

    let mut sells: Vec<&RankedAction> = ranked.sells().into_iter().filter(large).collect();
    let mut buys: Vec<&RankedAction> = ranked.buys().into_iter().filter(large).collect();
    sort_by_value(&mut sells);
    sort_by_value(&mut buys);

    prefixes(PatternKind::CostOptimized, sells.into_iter().chain(buys), max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::tests::sample_context;
    use crate::generators::GenerationSettings;
    use crate::model::TradeSide;

    fn ranked() -> RankedOpportunities {
        RankedOpportunities::new(&sample_context(), &GenerationSettings::default())
    }

    fn symbols(sequence: &ActionSequence) -> Vec<&str> {
        sequence.symbols().collect()
    }

    #[test]
    fn test_direct_buy_stays_within_cash() {
        let out = direct_buy(&ranked(), 5);
        // After MSFT (900) only 100 of the 1000 cash is left.
        assert_eq!(out.len(), 1);
        assert_eq!(symbols(&out[0]), vec!["MSFT"]);
    }

    #[test]
    fn test_profit_taking_prefixes() {
        let out = profit_taking(&ranked(), 5);
        assert_eq!(out.len(), 2);
        assert_eq!(symbols(&out[0]), vec!["NVDA"]);
        assert_eq!(symbols(&out[1]), vec!["NVDA", "AAPL"]);
        assert!((out[1].score().unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_rebalance_sells_before_buys() {
        let out = rebalance(&ranked(), 5);
        assert_eq!(symbols(out.last().unwrap()), vec!["TSLA", "SAP"]);
    }

    #[test]
    fn test_single_best_is_depth_one() {
        let out = single_best(&ranked());
        // Best overall is the NVDA sell, which is also the best sell.
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn test_multi_sell_has_two_or_more() {
        let out = multi_sell(&ranked(), 5);
        assert!(!out.is_empty());
        assert!(out.iter().all(|s| s.len() >= 2 && s.actions().iter().all(|a| a.is_sell())));
    }

    #[test]
    fn test_mixed_strategy_split() {
        let out = mixed_strategy(&ranked(), 4);
        let four = out.iter().find(|s| s.len() == 4).unwrap();
        let sides: Vec<TradeSide> = four.actions().iter().map(|a| a.side).collect();
        assert_eq!(sides, vec![TradeSide::Sell, TradeSide::Sell, TradeSide::Buy, TradeSide::Buy]);
    }

    #[test]
    fn test_mixed_strategy_stops_when_actions_run_out() {
        let out = mixed_strategy(&ranked(), usize::MAX);
        // Three sells and five buys.
        assert_eq!(out.len(), 8);
        assert_eq!(out.last().unwrap().len(), 8);
    }

    #[test]
    fn test_opportunity_first_adds_funding_when_short() {
        let mut ctx = sample_context();
        ctx.available_cash_eur = 100.0;
        let ranked = RankedOpportunities::new(&ctx, &GenerationSettings::default());
        let out = opportunity_first(&ranked, 5);
        let first = &out[0];
        // NVDA is the largest sell and covers MSFT on its own.
        assert_eq!(symbols(first), vec!["NVDA", "MSFT"]);
    }

    #[test]
    fn test_cash_generation_by_value() {
        let out = cash_generation(&ranked(), 5);
        assert_eq!(symbols(out.last().unwrap()), vec!["NVDA", "AAPL", "TSLA"]);
    }

    #[test]
    fn test_cost_optimized_drops_small_trades() {
        let out = cost_optimized(&ranked(), 10, &CostOptimizedParams::default());
        let all = out.last().unwrap();
        assert!(all.actions().iter().all(|a| a.value_eur >= 500.0));
        assert!(!symbols(all).contains(&"INTC"));
    }

    #[test]
    fn test_deep_rebalance_interleaves() {
        let out = deep_rebalance(&ranked(), 5);
        let sides: Vec<TradeSide> = out.last().unwrap().actions().iter().map(|a| a.side).collect();
        assert_eq!(sides[0], TradeSide::Sell);
        assert_eq!(sides[1], TradeSide::Buy);
    }
}
