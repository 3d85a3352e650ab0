//! Symbol tag rules.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::FilterContext;
use crate::model::{ActionSequence, TradeSide};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagParams {
    /// Tags excluded on either side
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    /// Tags a bought symbol must not carry
    #[serde(default)]
    pub exclude_buy_tags: Vec<String>,
    /// Tags a sold symbol must not carry
    #[serde(default)]
    pub exclude_sell_tags: Vec<String>,
}

impl TagParams {
    pub fn is_empty(&self) -> bool {
        self.exclude_tags.is_empty() && self.exclude_buy_tags.is_empty() && self.exclude_sell_tags.is_empty()
    }
}

/// Drop sequences with any action on a symbol carrying an excluded tag.
pub fn tags(sequences: Vec<ActionSequence>, params: &TagParams, ctx: &FilterContext<'_>) -> Vec<ActionSequence> {
    if params.is_empty() {
        return sequences;
    }

    let any: HashSet<&str> = params.exclude_tags.iter().map(String::as_str).collect();
    let buy: HashSet<&str> = params.exclude_buy_tags.iter().map(String::as_str).collect();
    let sell: HashSet<&str> = params.exclude_sell_tags.iter().map(String::as_str).collect();

    sequences
        .into_iter()
        .filter(|sequence| {
            sequence.actions().iter().all(|action| {
                let side_rules = match action.side {
                    TradeSide::Buy => &buy,
                    TradeSide::Sell => &sell,
                };
                ctx.tags_of(&action.symbol)
                    .iter()
                    .all(|tag| !any.contains(tag.as_str()) && !side_rules.contains(tag.as_str()))
            })
        })
        .collect()
}
