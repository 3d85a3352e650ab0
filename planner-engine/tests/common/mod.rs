//! Shared fixtures for integration tests.

#![allow(dead_code)]

use planner_engine::model::{
    ActionCandidate, ActionSequence, EvaluationContext, Opportunity, OpportunityContext, PortfolioContext,
    TradeSide,
};

pub fn buy(symbol: &str, value: f64) -> ActionCandidate {
    ActionCandidate::buy(symbol, 1, value, value).unwrap()
}

pub fn sell(symbol: &str, value: f64) -> ActionCandidate {
    ActionCandidate::sell(symbol, 1, value, value).unwrap()
}

pub fn seq(actions: Vec<ActionCandidate>) -> ActionSequence {
    ActionSequence::new(actions, None)
}

/// A portfolio holding AAPL and SAP.
pub fn portfolio() -> PortfolioContext {
    let mut p = PortfolioContext::default();
    p.positions.insert("AAPL".into(), 2000.0);
    p.positions.insert("SAP".into(), 1000.0);
    p.security_countries.insert("AAPL".into(), "US".into());
    p.security_countries.insert("SAP".into(), "DE".into());
    p.total_value = 3000.0;
    p
}

pub fn context(cash: f64) -> EvaluationContext {
    EvaluationContext::new(cash, portfolio())
}

/// `n` distinct sequences with a mix of feasible and infeasible buys.
pub fn sequences(n: usize) -> Vec<ActionSequence> {
    (0..n)
        .map(|i| {
            let value = 100.0 + (i % 7) as f64 * 250.0;
            seq(vec![buy(&format!("SYM{i}"), value)])
        })
        .collect()
}

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

pub fn opportunities() -> OpportunityContext {
    OpportunityContext {
        profit_taking: vec![opp("AAPL", TradeSide::Sell, 600.0, 0.9)],
        rebalance_sells: vec![opp("SAP", TradeSide::Sell, 300.0, 0.5)],
        opportunity_buys: vec![
            opp("MSFT", TradeSide::Buy, 700.0, 0.8),
            opp("ASML", TradeSide::Buy, 400.0, 0.6),
        ],
        averaging_down: vec![opp("INTC", TradeSide::Buy, 250.0, 0.4)],
        available_cash_eur: 800.0,
        total_portfolio_value_eur: 3800.0,
        ..Default::default()
    }
}
