use std::collections::BTreeMap;
use std::fmt;

use crate::feature::FeatureId;
use crate::unlink::{InvalidUnlink, UnlinkCandidate};

/// Problems found on one input feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub feature: FeatureId,
    /// Comma-joined labels, in the order they were found.
    pub labels: String,
    /// WKT of the feature as read.
    pub geometry: String,
}

#[derive(Debug, Default)]
struct Entry {
    labels: Vec<String>,
    geometry: String,
}

/// Folds labels of exploded parts and split pieces back to the input feature.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    entries: BTreeMap<FeatureId, Entry>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the original geometry text of an input feature.
    pub fn register(&mut self, feature: FeatureId, geometry: String) {
        self.entries.entry(feature).or_default().geometry = geometry;
    }

    pub fn add(&mut self, feature: FeatureId, label: impl fmt::Display) {
        let label = label.to_string();
        let entry = self.entries.entry(feature).or_default();
        if !entry.labels.contains(&label) {
            entry.labels.push(label);
        }
    }

    /// Records for every feature that picked up at least one label.
    pub fn finish(self) -> Vec<ErrorRecord> {
        self.entries
            .into_iter()
            .filter(|(_, e)| !e.labels.is_empty())
            .map(|(feature, e)| ErrorRecord {
                feature,
                labels: e.labels.join(", "),
                geometry: e.geometry,
            })
            .collect()
    }
}

/// Crossings suppressed by valid markers and markers that could not be used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnlinkReport {
    pub consumed: Vec<UnlinkCandidate>,
    pub invalid: Vec<InvalidUnlink>,
}
