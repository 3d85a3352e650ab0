//! Hash-based deduplication.

use std::collections::HashSet;

use crate::model::ActionSequence;

/// Keep the first occurrence of every sequence hash, in input order.
///
/// A sequence with an empty hash is never treated as a duplicate.
pub fn dedupe(sequences: Vec<ActionSequence>) -> Vec<ActionSequence> {
    let mut seen: HashSet<String> = HashSet::with_capacity(sequences.len());
    sequences
        .into_iter()
        .filter(|s| s.sequence_hash().is_empty() || seen.insert(s.sequence_hash().to_string()))
        .collect()
}
