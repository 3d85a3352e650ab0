//! Value types shared by every component.
//!
//! Sequences and contexts are immutable once built: generators create
//! sequences, filters drop them without mutation, and evaluation produces
//! separate result objects.

pub mod action;
pub mod opportunity;
pub mod pattern;
pub mod portfolio;
pub mod progress;
pub mod result;

pub use action::{ActionCandidate, ActionSequence, TradeSide};
pub use opportunity::{Opportunity, OpportunityCategory, OpportunityContext};
pub use pattern::PatternKind;
pub use portfolio::{
    effective_value, EvaluationContext, PortfolioContext, PriceAdjustments, ScoringParams,
    SecurityMeta, TransactionCosts,
};
pub use progress::{ProgressPhase, ProgressUpdate};
pub use result::{EvaluationResult, SimulationResult};
