//! Planner configuration.
//!
//! Parsed from the `planner` section of the service configuration
//! (`~/.planner/planner.json` when split into modular files). Generator and
//! filter names are closed sets; an unknown name fails at load time.

use planner_common::validation::{collect_errors, ensure_fraction, ensure_in_range, ensure_non_negative};
use planner_common::{Config, Error, Result, Validate, ValidationError, ValidationResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::filters::{FilterKind, FilterParamMap, FilterPipeline};
use crate::generators::{CombinatorialParams, CostOptimizedParams, GenerationSettings};
use crate::model::{
    EvaluationContext, PatternKind, PortfolioContext, ScoringParams, SecurityMeta, TransactionCosts,
};

// ============================================================================
// Planner Configuration
// ============================================================================

/// Upper bound on `max_depth`.
pub const MAX_DEPTH: i64 = 10;

/// Configuration of one planning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfiguration {
    /// Configuration identifier; best plans are stored per name
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum actions per sequence, at most [`MAX_DEPTH`]; `0` generates nothing
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,

    #[serde(default = "default_max_opportunities_per_category")]
    pub max_opportunities_per_category: usize,

    #[serde(default = "default_enabled_generators")]
    pub enabled_generators: Vec<PatternKind>,

    /// Filter chain, applied in this order
    #[serde(default = "default_enabled_filters")]
    pub enabled_filters: Vec<FilterKind>,

    /// Parameter maps keyed by generator name
    #[serde(default)]
    pub generator_params: BTreeMap<String, Map<String, Value>>,

    /// Parameter maps keyed by filter name
    #[serde(default)]
    pub filter_params: FilterParamMap,

    // === Costs ===
    #[serde(default = "default_transaction_cost_fixed")]
    pub transaction_cost_fixed: f64,

    #[serde(default = "default_transaction_cost_percent")]
    pub transaction_cost_percent: f64,

    #[serde(default = "default_spread")]
    pub transaction_cost_spread: f64,

    #[serde(default = "default_slippage")]
    pub transaction_cost_slippage: f64,

    // === Scoring ===
    #[serde(default = "default_cost_penalty_factor")]
    pub cost_penalty_factor: f64,

    /// Cash held back from every plan, in EUR
    #[serde(default)]
    pub min_cash_reserve: f64,

    #[serde(default = "default_optimizer_target_return")]
    pub optimizer_target_return: f64,

    #[serde(default = "default_optimizer_blend")]
    pub optimizer_blend: f64,

    // === Sides ===
    #[serde(default = "default_true")]
    pub allow_buy: bool,

    #[serde(default = "default_true")]
    pub allow_sell: bool,
}

impl Default for PlannerConfiguration {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_depth: default_max_depth(),
            max_opportunities_per_category: default_max_opportunities_per_category(),
            enabled_generators: default_enabled_generators(),
            enabled_filters: default_enabled_filters(),
            generator_params: BTreeMap::new(),
            filter_params: FilterParamMap::new(),
            transaction_cost_fixed: default_transaction_cost_fixed(),
            transaction_cost_percent: default_transaction_cost_percent(),
            transaction_cost_spread: default_spread(),
            transaction_cost_slippage: default_slippage(),
            cost_penalty_factor: default_cost_penalty_factor(),
            min_cash_reserve: 0.0,
            optimizer_target_return: default_optimizer_target_return(),
            optimizer_blend: default_optimizer_blend(),
            allow_buy: true,
            allow_sell: true,
        }
    }
}

fn default_name() -> String {
    "default".to_string()
}

fn default_max_depth() -> i64 {
    5
}

fn default_max_opportunities_per_category() -> usize {
    5
}

fn default_enabled_generators() -> Vec<PatternKind> {
    PatternKind::ALL.to_vec()
}

fn default_enabled_filters() -> Vec<FilterKind> {
    vec![
        FilterKind::Dedupe,
        FilterKind::Tags,
        FilterKind::CorrelationAware,
        FilterKind::Diversity,
    ]
}

fn default_transaction_cost_fixed() -> f64 {
    5.0
}

fn default_transaction_cost_percent() -> f64 {
    0.001
}

fn default_spread() -> f64 {
    0.001
}

fn default_slippage() -> f64 {
    0.0015
}

fn default_cost_penalty_factor() -> f64 {
    0.1
}

fn default_optimizer_target_return() -> f64 {
    0.11
}

fn default_optimizer_blend() -> f64 {
    0.45
}

fn default_true() -> bool {
    true
}

fn parse_generator_params<T: DeserializeOwned>(kind: PatternKind, map: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(map.clone()))
        .map_err(|e| Error::Config(format!("invalid parameters for generator '{kind}': {e}")))
}

impl PlannerConfiguration {
    /// Parse a raw `planner` section. `null` yields the defaults.
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_value(value.clone())
            .map_err(|e| Error::Config(format!("invalid planner configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Planner section of the service configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_value(&config.planner)
    }

    /// Identifier used to key persisted plans.
    pub fn config_id(&self) -> &str {
        &self.name
    }

    pub fn transaction_costs(&self) -> TransactionCosts {
        TransactionCosts {
            fixed: self.transaction_cost_fixed,
            percent: self.transaction_cost_percent,
            spread: self.transaction_cost_spread,
            slippage: self.transaction_cost_slippage,
        }
    }

    pub fn scoring_params(&self) -> ScoringParams {
        ScoringParams {
            cost_penalty_factor: self.cost_penalty_factor,
            optimizer_target_return: self.optimizer_target_return,
            optimizer_blend: self.optimizer_blend,
        }
    }

    /// Generator settings, with typed parameters.
    pub fn generation_settings(&self) -> Result<GenerationSettings> {
        let mut combinatorial = CombinatorialParams::default();
        let mut cost_optimized = CostOptimizedParams::default();

        for (name, map) in &self.generator_params {
            let kind = PatternKind::from_str(name)?;
            match kind {
                PatternKind::Combinatorial => combinatorial = parse_generator_params(kind, map)?,
                PatternKind::CostOptimized => cost_optimized = parse_generator_params(kind, map)?,
                _ if map.is_empty() => {}
                _ => {
                    return Err(Error::Config(format!("generator '{kind}' takes no parameters")));
                }
            }
        }

        Ok(GenerationSettings {
            max_depth: self.max_depth,
            max_opportunities_per_category: self.max_opportunities_per_category,
            enabled: self.enabled_generators.clone(),
            allow_buy: self.allow_buy,
            allow_sell: self.allow_sell,
            combinatorial,
            cost_optimized,
        })
    }

    /// The configured filter chain.
    pub fn filter_pipeline(&self) -> Result<FilterPipeline> {
        FilterPipeline::from_config(&self.enabled_filters, &self.filter_params)
    }

    /// Starting state for evaluation, with the cash reserve held back.
    pub fn evaluation_context(
        &self,
        available_cash_eur: f64,
        portfolio: PortfolioContext,
        security_meta: BTreeMap<String, SecurityMeta>,
    ) -> EvaluationContext {
        EvaluationContext {
            available_cash_eur: (available_cash_eur - self.min_cash_reserve).max(0.0),
            portfolio,
            security_meta,
            costs: self.transaction_costs(),
            scoring: self.scoring_params(),
        }
    }
}

impl Validate for PlannerConfiguration {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            ensure_in_range("planner.max_depth", self.max_depth, 0, MAX_DEPTH),
            ensure_non_negative("planner.transaction_cost_fixed", self.transaction_cost_fixed),
            ensure_non_negative("planner.transaction_cost_percent", self.transaction_cost_percent),
            ensure_non_negative("planner.transaction_cost_spread", self.transaction_cost_spread),
            ensure_non_negative("planner.transaction_cost_slippage", self.transaction_cost_slippage),
            ensure_non_negative("planner.cost_penalty_factor", self.cost_penalty_factor),
            ensure_non_negative("planner.min_cash_reserve", self.min_cash_reserve),
            ensure_non_negative("planner.optimizer_target_return", self.optimizer_target_return),
            ensure_fraction("planner.optimizer_blend", self.optimizer_blend),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect();

        if let Err(e) = self.generation_settings() {
            errors.push(ValidationError::InvalidValue {
                field: "planner.generator_params".into(),
                reason: e.to_string(),
            });
        }
        if let Err(e) = self.filter_pipeline() {
            errors.push(ValidationError::InvalidValue {
                field: "planner.filter_params".into(),
                reason: e.to_string(),
            });
        }

        collect_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_section_uses_defaults() {
        let config = PlannerConfiguration::from_value(&Value::Null).unwrap();
        assert_eq!(config, PlannerConfiguration::default());
        assert_eq!(config.enabled_generators.len(), 12);
        assert_eq!(config.enabled_filters[0], FilterKind::Dedupe);
        assert_eq!(config.config_id(), "default");
    }

    #[test]
    fn test_unknown_generator_rejected() {
        let err = PlannerConfiguration::from_value(&json!({"enabled_generators": ["direct_buy", "moonshot"]}))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_param_key_rejected() {
        let value = json!({"generator_params": {"combinatorial": {"max_candidates": 4, "depth": 2}}});
        assert!(PlannerConfiguration::from_value(&value).unwrap_err().is_validation());

        let value = json!({"generator_params": {"combinatorial": {"max_candidates": 4}}});
        let config = PlannerConfiguration::from_value(&value).unwrap();
        assert_eq!(config.generation_settings().unwrap().combinatorial.max_candidates, 4);
    }

    #[test]
    fn test_negative_cost_and_blend_rejected() {
        let value = json!({"transaction_cost_fixed": -1.0, "optimizer_blend": 1.5});
        match PlannerConfiguration::from_value(&value).unwrap_err() {
            Error::Validation(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_max_depth_bounds() {
        for depth in [-1, MAX_DEPTH + 1, 1 << 40] {
            let err = PlannerConfiguration::from_value(&json!({ "max_depth": depth })).unwrap_err();
            assert!(err.is_validation(), "max_depth={depth}");
        }
        for depth in [0, MAX_DEPTH] {
            let config = PlannerConfiguration::from_value(&json!({ "max_depth": depth })).unwrap();
            assert_eq!(config.max_depth, depth);
        }
    }

    #[test]
    fn test_cash_reserve_held_back() {
        let config = PlannerConfiguration {
            min_cash_reserve: 300.0,
            ..Default::default()
        };
        let ctx = config.evaluation_context(1000.0, PortfolioContext::default(), BTreeMap::new());
        assert_eq!(ctx.available_cash_eur, 700.0);
        assert_eq!(ctx.costs.slippage, 0.0015);
        let ctx = config.evaluation_context(100.0, PortfolioContext::default(), BTreeMap::new());
        assert_eq!(ctx.available_cash_eur, 0.0);
    }
}
