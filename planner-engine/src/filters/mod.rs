//! Filter pipeline.
//!
//! An ordered chain of pure filters applied to the generated candidates:
//!
//! ```text
//! sequences ──► dedupe ──► tags ──► correlation_aware ──► diversity ──► survivors
//!                 │          │              │                  │
//!                 └──────────┴──── FilterStageResult per stage ┘
//! ```
//!
//! Every filter keeps survivors in their input order, never mutates a
//! sequence, and passes empty input through unchanged.

pub mod correlation;
pub mod dedupe;
pub mod diversity;
pub mod tags;

use planner_common::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

pub use correlation::CorrelationParams;
pub use diversity::DiversityParams;
pub use tags::TagParams;

use crate::model::{ActionSequence, PortfolioContext, SecurityMeta};

/// Per-filter parameter maps, keyed by filter name.
pub type FilterParamMap = BTreeMap<String, Map<String, Value>>;

// ============================================================================
// Filter Kind
// ============================================================================

/// Known filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Dedupe,
    Diversity,
    CorrelationAware,
    Tags,
}

impl FilterKind {
    pub const ALL: [FilterKind; 4] = [Self::Dedupe, Self::Diversity, Self::CorrelationAware, Self::Tags];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dedupe => "dedupe",
            Self::Diversity => "diversity",
            Self::CorrelationAware => "correlation_aware",
            Self::Tags => "tags",
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown filter '{s}'")))
    }
}

// ============================================================================
// Filter Context
// ============================================================================

/// Read-only data filters may consult.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub portfolio: &'a PortfolioContext,
    pub security_meta: &'a BTreeMap<String, SecurityMeta>,
    pub security_tags: &'a BTreeMap<String, Vec<String>>,
}

impl<'a> FilterContext<'a> {
    pub fn new(
        portfolio: &'a PortfolioContext,
        security_meta: &'a BTreeMap<String, SecurityMeta>,
        security_tags: &'a BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            portfolio,
            security_meta,
            security_tags,
        }
    }

    /// Country from the portfolio snapshot, falling back to security metadata.
    pub fn country_of(&self, symbol: &str) -> Option<&'a str> {
        self.portfolio
            .security_countries
            .get(symbol)
            .or_else(|| self.security_meta.get(symbol)?.country.as_ref())
            .map(String::as_str)
    }

    /// Industry from the portfolio snapshot, falling back to security metadata.
    pub fn industry_of(&self, symbol: &str) -> Option<&'a str> {
        self.portfolio
            .security_industries
            .get(symbol)
            .or_else(|| self.security_meta.get(symbol)?.industry.as_ref())
            .map(String::as_str)
    }

    pub fn tags_of(&self, symbol: &str) -> &'a [String] {
        self.security_tags.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ============================================================================
// Sequence Filter
// ============================================================================

/// A configured filter.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceFilter {
    Dedupe,
    Diversity(DiversityParams),
    CorrelationAware(CorrelationParams),
    Tags(TagParams),
}

fn parse_params<T: DeserializeOwned + Default>(kind: FilterKind, params: Option<&Map<String, Value>>) -> Result<T> {
    match params {
        None => Ok(T::default()),
        Some(map) => serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| Error::Config(format!("invalid parameters for filter '{kind}': {e}"))),
    }
}

impl SequenceFilter {
    /// Build a filter from its kind and optional parameter map.
    /// Unknown parameter keys are a configuration error.
    pub fn from_params(kind: FilterKind, params: Option<&Map<String, Value>>) -> Result<Self> {
        Ok(match kind {
            FilterKind::Dedupe => {
                if params.is_some_and(|p| !p.is_empty()) {
                    return Err(Error::Config("filter 'dedupe' takes no parameters".into()));
                }
                Self::Dedupe
            }
            FilterKind::Diversity => Self::Diversity(parse_params(kind, params)?),
            FilterKind::CorrelationAware => Self::CorrelationAware(parse_params(kind, params)?),
            FilterKind::Tags => Self::Tags(parse_params(kind, params)?),
        })
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Dedupe => FilterKind::Dedupe,
            Self::Diversity(_) => FilterKind::Diversity,
            Self::CorrelationAware(_) => FilterKind::CorrelationAware,
            Self::Tags(_) => FilterKind::Tags,
        }
    }

    pub fn apply(&self, sequences: Vec<ActionSequence>, ctx: &FilterContext<'_>) -> Vec<ActionSequence> {
        if sequences.is_empty() {
            return sequences;
        }
        match self {
            Self::Dedupe => dedupe::dedupe(sequences),
            Self::Diversity(params) => diversity::diversity(sequences, params),
            Self::CorrelationAware(params) => correlation::correlation_aware(sequences, params, ctx),
            Self::Tags(params) => tags::tags(sequences, params, ctx),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Counts for one filter stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStageResult {
    pub filter: FilterKind,
    pub input: usize,
    pub passed: usize,
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterStageResult {
    pub fn new(filter: FilterKind, input: usize, passed: usize) -> Self {
        let eliminated = input.saturating_sub(passed);
        let elimination_rate = if input > 0 {
            (eliminated as f64 / input as f64) * 100.0
        } else {
            0.0
        };

        Self {
            filter,
            input,
            passed,
            eliminated,
            elimination_rate,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub sequences: Vec<ActionSequence>,
    pub stages: Vec<FilterStageResult>,
}

/// Ordered chain of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPipeline {
    filters: Vec<SequenceFilter>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<SequenceFilter>) -> Self {
        Self { filters }
    }

    /// Build the chain for `enabled`, in that order.
    ///
    /// Parameter maps for filters that are not enabled are still rejected
    /// if they name an unknown filter.
    pub fn from_config(enabled: &[FilterKind], params: &FilterParamMap) -> Result<Self> {
        for name in params.keys() {
            FilterKind::from_str(name)?;
        }

        let filters = enabled
            .iter()
            .map(|kind| SequenceFilter::from_params(*kind, params.get(kind.as_str())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[SequenceFilter] {
        &self.filters
    }

    /// Apply every filter in order.
    pub fn run(&self, sequences: Vec<ActionSequence>, ctx: &FilterContext<'_>) -> FilterOutcome {
        let initial = sequences.len();
        let mut current = sequences;
        let mut stages = Vec::with_capacity(self.filters.len());

        for filter in &self.filters {
            let input = current.len();
            current = filter.apply(current, ctx);
            let stage = FilterStageResult::new(filter.kind(), input, current.len());
            debug!(
                filter = %stage.filter,
                input = stage.input,
                passed = stage.passed,
                eliminated = stage.eliminated,
                "Filter stage complete"
            );
            stages.push(stage);
        }

        info!(input = initial, output = current.len(), stages = stages.len(), "Filter pipeline complete");

        FilterOutcome {
            sequences: current,
            stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionCandidate;
    use serde_json::json;

    fn params(value: Value) -> FilterParamMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_filter_kind_names() {
        assert_eq!("correlation_aware".parse::<FilterKind>().unwrap(), FilterKind::CorrelationAware);
        assert!("sharpe".parse::<FilterKind>().is_err());
    }

    #[test]
    fn test_unknown_param_key_rejected() {
        let p = params(json!({"diversity": {"max_per_symbol": 2, "bogus": 1}}));
        let err = FilterPipeline::from_config(&[FilterKind::Diversity], &p).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_filter_name_rejected() {
        let p = params(json!({"sharpe": {}}));
        assert!(FilterPipeline::from_config(&[FilterKind::Dedupe], &p).is_err());
    }

    #[test]
    fn test_params_applied() {
        let p = params(json!({"diversity": {"max_per_symbol": 1}}));
        let pipeline = FilterPipeline::from_config(&[FilterKind::Dedupe, FilterKind::Diversity], &p).unwrap();
        assert_eq!(
            pipeline.filters()[1],
            SequenceFilter::Diversity(DiversityParams {
                max_per_symbol: 1,
                max_per_pattern: None
            })
        );
    }

    #[test]
    fn test_run_records_stages() {
        let portfolio = PortfolioContext::default();
        let meta = BTreeMap::new();
        let tag_map = BTreeMap::new();
        let ctx = FilterContext::new(&portfolio, &meta, &tag_map);

        let a = ActionSequence::new(vec![ActionCandidate::buy("A", 1, 1.0, 1.0).unwrap()], None);
        let pipeline = FilterPipeline::from_config(&[FilterKind::Dedupe], &FilterParamMap::new()).unwrap();
        let outcome = pipeline.run(vec![a.clone(), a.clone(), a], &ctx);

        assert_eq!(outcome.sequences.len(), 1);
        assert_eq!(outcome.stages, vec![FilterStageResult::new(FilterKind::Dedupe, 3, 1)]);
        assert!((outcome.stages[0].elimination_rate - 200.0 / 3.0).abs() < 1e-9);

        let empty = pipeline.run(Vec::new(), &ctx);
        assert!(empty.sequences.is_empty());
        assert_eq!(empty.stages[0].elimination_rate, 0.0);
    }
}
