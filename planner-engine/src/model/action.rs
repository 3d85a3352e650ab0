//! Trade actions and action sequences.

use planner_common::validation::{ensure_non_negative, Validate, ValidationError, ValidationResult};
use planner_common::{Error, Result};
use serde::{Deserialize, Serialize};

use super::pattern::PatternKind;
use crate::hash::sequence_hash;

// ============================================================================
// Trade Side
// ============================================================================

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Action Candidate
// ============================================================================

/// A single proposed trade.
///
/// Fields are read through accessors; every instance outside this crate
/// comes from the validated constructors or deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ActionPayload")]
pub struct ActionCandidate {
    pub(crate) symbol: String,
    pub(crate) side: TradeSide,
    pub(crate) quantity: u64,
    /// Price per unit in `currency`
    pub(crate) price: f64,
    /// Precomputed trade value in EUR
    pub(crate) value_eur: f64,
    pub(crate) currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// Wire form of an action, validated on the way in.
#[derive(Deserialize)]
struct ActionPayload {
    symbol: String,
    side: TradeSide,
    quantity: u64,
    price: f64,
    value_eur: f64,
    #[serde(default = "default_currency")]
    currency: String,
}

impl TryFrom<ActionPayload> for ActionCandidate {
    type Error = Error;

    fn try_from(p: ActionPayload) -> Result<Self> {
        Self::new(p.symbol, p.side, p.quantity, p.price, p.value_eur, p.currency)
    }
}

impl ActionCandidate {
    /// Create a validated action.
    pub fn new(
        symbol: impl Into<String>,
        side: TradeSide,
        quantity: u64,
        price: f64,
        value_eur: f64,
        currency: impl Into<String>,
    ) -> Result<Self> {
        let action = Self {
            symbol: symbol.into(),
            side,
            quantity,
            price,
            value_eur,
            currency: currency.into(),
        };
        action.validate()?;
        Ok(action)
    }

    /// EUR-denominated buy.
    pub fn buy(symbol: impl Into<String>, quantity: u64, price: f64, value_eur: f64) -> Result<Self> {
        Self::new(symbol, TradeSide::Buy, quantity, price, value_eur, "EUR")
    }

    /// EUR-denominated sell.
    pub fn sell(symbol: impl Into<String>, quantity: u64, price: f64, value_eur: f64) -> Result<Self> {
        Self::new(symbol, TradeSide::Sell, quantity, price, value_eur, "EUR")
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> TradeSide {
        self.side
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn value_eur(&self) -> f64 {
        self.value_eur
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_buy(&self) -> bool {
        self.side == TradeSide::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == TradeSide::Sell
    }
}

impl Validate for ActionCandidate {
    fn validate(&self) -> ValidationResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "action.symbol".into(),
            });
        }
        if self.quantity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "action.quantity".into(),
                reason: format!("quantity for {} must be greater than zero", self.symbol),
            });
        }
        ensure_non_negative("action.price", self.price)?;
        ensure_non_negative("action.value_eur", self.value_eur)?;
        Ok(())
    }
}

// ============================================================================
// Action Sequence
// ============================================================================

/// An ordered list of actions proposed together as one plan.
///
/// The hash is computed once at construction from the ordered
/// `(symbol, side, quantity)` tuples and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SequencePayload")]
pub struct ActionSequence {
    actions: Vec<ActionCandidate>,
    sequence_hash: String,
    pattern: Option<PatternKind>,
    score: Option<f64>,
}

/// Wire form of a sequence. The hash is always recomputed on the way in.
#[derive(Deserialize)]
struct SequencePayload {
    actions: Vec<ActionCandidate>,
    #[serde(default)]
    pattern: Option<PatternKind>,
    #[serde(default)]
    score: Option<f64>,
}

impl TryFrom<SequencePayload> for ActionSequence {
    type Error = Error;

    fn try_from(payload: SequencePayload) -> Result<Self> {
        let mut sequence = Self::new(payload.actions, payload.pattern);
        sequence.score = payload.score;
        Ok(sequence)
    }
}

impl ActionSequence {
    /// Build a sequence, computing its hash.
    pub fn new(actions: Vec<ActionCandidate>, pattern: Option<PatternKind>) -> Self {
        let sequence_hash = sequence_hash(&actions);
        Self {
            actions,
            sequence_hash,
            pattern,
            score: None,
        }
    }

    /// Build a sequence carrying the generator's heuristic score.
    pub fn scored(actions: Vec<ActionCandidate>, pattern: PatternKind, score: f64) -> Self {
        let mut sequence = Self::new(actions, Some(pattern));
        sequence.score = Some(score);
        sequence
    }

    /// Build a sequence with an explicit hash. Used for externally hashed
    /// sequences; an empty hash opts the sequence out of deduplication.
    pub fn with_hash(
        actions: Vec<ActionCandidate>,
        sequence_hash: impl Into<String>,
        pattern: Option<PatternKind>,
    ) -> Self {
        Self {
            actions,
            sequence_hash: sequence_hash.into(),
            pattern,
            score: None,
        }
    }

    pub fn actions(&self) -> &[ActionCandidate] {
        &self.actions
    }

    pub fn sequence_hash(&self) -> &str {
        &self.sequence_hash
    }

    pub fn pattern(&self) -> Option<PatternKind> {
        self.pattern
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Symbols touched by this sequence, in action order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.symbol.as_str())
    }
}
