//! Caps how many sequences touch the same symbol or come from the same pattern.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::ActionSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiversityParams {
    /// Maximum surviving sequences that touch any one symbol
    #[serde(default = "default_max_per_symbol")]
    pub max_per_symbol: usize,
    /// Maximum surviving sequences per generator; unlimited when unset
    #[serde(default)]
    pub max_per_pattern: Option<usize>,
}

fn default_max_per_symbol() -> usize {
    3
}

impl Default for DiversityParams {
    fn default() -> Self {
        Self {
            max_per_symbol: default_max_per_symbol(),
            max_per_pattern: None,
        }
    }
}

/// Earlier sequences claim symbol and pattern slots first.
pub fn diversity(sequences: Vec<ActionSequence>, params: &DiversityParams) -> Vec<ActionSequence> {
    let max_per_pattern = params.max_per_pattern.unwrap_or(usize::MAX);
    let mut per_symbol: HashMap<String, usize> = HashMap::new();
    let mut per_pattern: HashMap<String, usize> = HashMap::new();

    sequences
        .into_iter()
        .filter(|sequence| {
            let pattern_key = sequence.pattern().map_or("", |p| p.as_str());
            if per_pattern.get(pattern_key).copied().unwrap_or(0) >= max_per_pattern {
                return false;
            }
            let saturated = sequence
                .symbols()
                .any(|s| per_symbol.get(s).copied().unwrap_or(0) >= params.max_per_symbol);
            if saturated {
                return false;
            }

            *per_pattern.entry(pattern_key.to_string()).or_insert(0) += 1;
            for symbol in sequence.symbols() {
                *per_symbol.entry(symbol.to_string()).or_insert(0) += 1;
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionCandidate, PatternKind};

    fn seq(symbols: &[&str], pattern: PatternKind) -> ActionSequence {
        let actions = symbols
            .iter()
            .map(|s| ActionCandidate::buy(*s, 1, 1.0, 1.0).unwrap())
            .collect();
        ActionSequence::new(actions, Some(pattern))
    }

    #[test]
    fn test_symbol_cap() {
        let input = vec![
            seq(&["A"], PatternKind::DirectBuy),
            seq(&["A", "B"], PatternKind::Rebalance),
            seq(&["A", "C"], PatternKind::Combinatorial),
            seq(&["C"], PatternKind::Combinatorial),
        ];
        let params = DiversityParams {
            max_per_symbol: 2,
            max_per_pattern: None,
        };
        let out = diversity(input, &params);
        let kept: Vec<Vec<&str>> = out.iter().map(|s| s.symbols().collect()).collect();
        assert_eq!(kept, vec![vec!["A"], vec!["A", "B"], vec!["C"]]);
    }

    #[test]
    fn test_pattern_cap() {
        let input = vec![
            seq(&["A"], PatternKind::Combinatorial),
            seq(&["B"], PatternKind::Combinatorial),
            seq(&["C"], PatternKind::DirectBuy),
        ];
        let params = DiversityParams {
            max_per_symbol: 10,
            max_per_pattern: Some(1),
        };
        let out = diversity(input, &params);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].pattern(), Some(PatternKind::DirectBuy));
    }
}
