//! Per-feature-group scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sluice_graph::FeatureIndices;

/// A score keyed by feature-group indices, such as an importance or a cost.
///
/// Serialized as a list of `{ "indices": ..., "value": ... }` entries, since
/// group indices cannot be JSON object keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ScoreEntry>", into = "Vec<ScoreEntry>")]
pub struct FeatureScores(BTreeMap<FeatureIndices, f64>);

/// One serialized score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Group indices.
    pub indices: FeatureIndices,
    /// Score of the group.
    pub value: f64,
}

impl FeatureScores {
    /// Creates an empty score map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the score of a group.
    pub fn insert(&mut self, indices: FeatureIndices, value: f64) -> Option<f64> {
        self.0.insert(indices, value)
    }

    /// Returns the score of a group.
    pub fn get(&self, indices: &FeatureIndices) -> Option<f64> {
        self.0.get(indices).copied()
    }

    /// Iterates over scores in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeatureIndices, f64)> {
        self.0.iter().map(|(indices, value)| (indices, *value))
    }

    /// Number of scored groups.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no group is scored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(FeatureIndices, f64)> for FeatureScores {
    fn from_iter<I: IntoIterator<Item = (FeatureIndices, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<ScoreEntry>> for FeatureScores {
    fn from(entries: Vec<ScoreEntry>) -> Self {
        entries
            .into_iter()
            .map(|entry| (entry.indices, entry.value))
            .collect()
    }
}

impl From<FeatureScores> for Vec<ScoreEntry> {
    fn from(scores: FeatureScores) -> Self {
        scores
            .0
            .into_iter()
            .map(|(indices, value)| ScoreEntry { indices, value })
            .collect()
    }
}
