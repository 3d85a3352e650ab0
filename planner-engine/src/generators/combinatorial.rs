//! Bounded combinations of high-priority candidates.
//!
//! Candidates above the priority threshold are combined into every subset
//! of size `1..=max_depth` (lexicographic over the ranked candidate list),
//! laid out sells first, until `max_combinations` sequences exist.

use super::{CombinatorialParams, Draft, RankedAction, RankedOpportunities};
use crate::model::{ActionSequence, PatternKind};

pub(super) fn generate(
    ranked: &RankedOpportunities,
    max_depth: usize,
    params: &CombinatorialParams,
) -> Vec<ActionSequence> {
    let mut candidates: Vec<&RankedAction> = ranked
        .sells()
        .into_iter()
        .chain(ranked.buys())
        .filter(|r| r.priority >= params.priority_threshold)
        .collect();
    candidates.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| a.action.symbol.cmp(&b.action.symbol))
    });
    candidates.truncate(params.max_candidates);

    let n = candidates.len();
    let mut out = Vec::new();

    for size in 1..=max_depth.min(n) {
        let mut indices: Vec<usize> = (0..size).collect();
        loop {
            if out.len() >= params.max_combinations {
                return out;
            }
            if let Some(sequence) = build(&candidates, &indices) {
                out.push(sequence);
            }
            if !advance(&mut indices, n) {
                break;
            }
        }
    }
    out
}

/// Sells first, then buys; `None` if two picks share a symbol.
fn build(candidates: &[&RankedAction], indices: &[usize]) -> Option<ActionSequence> {
    let picks = indices.iter().map(|i| candidates[*i]);
    let mut draft = Draft::default();
    for pick in picks.clone().filter(|r| r.action.is_sell()).chain(picks.filter(|r| r.action.is_buy())) {
        if !draft.push(pick) {
            return None;
        }
    }
    Some(draft.finish(PatternKind::Combinatorial))
}

/// Next k-combination of `0..n` in lexicographic order.
fn advance(indices: &mut [usize], n: usize) -> bool {
    let k = indices.len();
    let Some(i) = (0..k).rev().find(|&i| indices[i] < n - k + i) else {
        return false;
    };
    indices[i] += 1;
    for j in i + 1..k {
        indices[j] = indices[j - 1] + 1;
    }
    true
}
