//! Deterministic fingerprints for sequences and portfolio snapshots.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::model::{ActionCandidate, OpportunityContext, PortfolioContext};

/// Length of the portfolio hash used as a cache key.
pub const PORTFOLIO_HASH_LEN: usize = 16;

/// Hash of the ordered `(symbol, side, quantity)` tuples.
///
/// The digest covers the JSON array `[["SYM","BUY",10],...]`, so it is
/// sensitive to order and insensitive to price or EUR value. An empty
/// action list yields an empty hash.
pub fn sequence_hash(actions: &[ActionCandidate]) -> String {
    if actions.is_empty() {
        return String::new();
    }

    let tuples: Vec<Value> = actions
        .iter()
        .map(|a| json!([a.symbol, a.side.as_str(), a.quantity]))
        .collect();
    let canonical = Value::Array(tuples).to_string();

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Fingerprint of a portfolio snapshot plus the opportunities it is planned against.
///
/// Values are rounded to cents so that float noise does not produce a new
/// key. Map-backed fields serialize with sorted keys.
pub fn portfolio_hash(
    portfolio: &PortfolioContext,
    cash_eur: f64,
    opportunities: &OpportunityContext,
) -> String {
    let positions: Vec<Value> = portfolio
        .positions
        .iter()
        .map(|(symbol, value)| json!([symbol, cents(*value)]))
        .collect();

    let mut opps: Vec<(String, &str, u64)> = opportunities
        .all()
        .map(|(_, o)| (o.symbol.clone(), o.side.as_str(), o.quantity))
        .collect();
    opps.sort();

    let canonical = json!({
        "positions": positions,
        "countries": portfolio.security_countries,
        "industries": portfolio.security_industries,
        "cash": cents(cash_eur),
        "opportunities": opps,
    })
    .to_string();

    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    digest[..PORTFOLIO_HASH_LEN].to_string()
}
