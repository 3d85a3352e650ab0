//! Cluster-exposure filter.
//!
//! Projects the portfolio after a sequence and rejects it when a country or
//! industry cluster that the sequence grows would exceed its exposure cap,
//! or when the sequence piles too many buys into one cluster.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::FilterContext;
use crate::model::{ActionSequence, TradeSide};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationParams {
    /// Maximum projected share of one country
    #[serde(default = "default_max_country_exposure")]
    pub max_country_exposure: f64,
    /// Maximum projected share of one industry
    #[serde(default = "default_max_industry_exposure")]
    pub max_industry_exposure: f64,
    /// Maximum buys into the same cluster within one sequence
    #[serde(default = "default_max_buys_per_cluster")]
    pub max_buys_per_cluster: usize,
}

fn default_max_country_exposure() -> f64 {
    0.5
}

fn default_max_industry_exposure() -> f64 {
    0.4
}

fn default_max_buys_per_cluster() -> usize {
    2
}

impl Default for CorrelationParams {
    fn default() -> Self {
        Self {
            max_country_exposure: default_max_country_exposure(),
            max_industry_exposure: default_max_industry_exposure(),
            max_buys_per_cluster: default_max_buys_per_cluster(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dimension {
    Country,
    Industry,
}

type Cluster<'a> = (Dimension, &'a str);

pub fn correlation_aware(
    sequences: Vec<ActionSequence>,
    params: &CorrelationParams,
    ctx: &FilterContext<'_>,
) -> Vec<ActionSequence> {
    sequences
        .into_iter()
        .filter(|sequence| within_limits(sequence, params, ctx))
        .collect()
}

fn clusters_of<'a>(ctx: &'a FilterContext<'_>, symbol: &str) -> Vec<Cluster<'a>> {
    let mut out = Vec::with_capacity(2);
    if let Some(country) = ctx.country_of(symbol) {
        out.push((Dimension::Country, country));
    }
    if let Some(industry) = ctx.industry_of(symbol) {
        out.push((Dimension::Industry, industry));
    }
    out
}

fn exposure<'c>(
    ctx: &'c FilterContext<'_>,
    values: &HashMap<&str, f64>,
    total: f64,
) -> HashMap<Cluster<'c>, f64> {
    let mut shares: HashMap<Cluster<'c>, f64> = HashMap::new();
    for (symbol, value) in values {
        for cluster in clusters_of(ctx, symbol) {
            *shares.entry(cluster).or_insert(0.0) += value / total;
        }
    }
    shares
}

fn within_limits(sequence: &ActionSequence, params: &CorrelationParams, ctx: &FilterContext<'_>) -> bool {
    let start: HashMap<&str, f64> = ctx
        .portfolio
        .positions
        .iter()
        .map(|(s, v)| (s.as_str(), *v))
        .collect();
    let start_total: f64 = start.values().sum();
    let mut positions = start.clone();

    let mut buys_per_cluster: HashMap<Cluster<'_>, usize> = HashMap::new();
    for action in sequence.actions() {
        let held = positions.entry(action.symbol.as_str()).or_insert(0.0);
        match action.side {
            TradeSide::Buy => {
                *held += action.value_eur;
                for cluster in clusters_of(ctx, &action.symbol) {
                    let count = buys_per_cluster.entry(cluster).or_insert(0);
                    *count += 1;
                    if *count > params.max_buys_per_cluster {
                        return false;
                    }
                }
            }
            TradeSide::Sell => *held = (*held - action.value_eur).max(0.0),
        }
    }

    // An empty starting portfolio has no meaningful exposure baseline.
    let end_total: f64 = positions.values().sum();
    if start_total <= 0.0 || end_total <= 0.0 {
        return true;
    }

    let before = exposure(ctx, &start, start_total);
    let after = exposure(ctx, &positions, end_total);

    after.iter().all(|(cluster, share)| {
        let limit = match cluster.0 {
            Dimension::Country => params.max_country_exposure,
            Dimension::Industry => params.max_industry_exposure,
        };
        let grown = *share > before.get(cluster).copied().unwrap_or(0.0) + f64::EPSILON;
        !grown || *share <= limit
    })
}
