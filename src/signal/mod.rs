//! Signal model - the unit of evidence waves produce and consumers read.
//!
//! Keys follow a dotted taxonomy (`identity.*`, `color.*`, `quality.*`,
//! `content.*`, `motion.*`, `complexity.*`, `vision.*`, `ocr.*`,
//! `validation.*`) listed in full in [`taxonomy`].

mod confidence;
mod value;

pub mod taxonomy;

pub use confidence::Confidence;
pub use value::SignalValue;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single piece of evidence written to the blackboard.
///
/// Once written, a `Signal`'s value and confidence are never mutated in
/// place; refinements are written as new signals with a later `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub key: String,
    pub value: SignalValue,
    pub confidence: Confidence,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub tags: HashSet<String>,
    pub metadata: BTreeMap<String, SignalValue>,
}

impl Signal {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<SignalValue>,
        confidence: impl Into<Confidence>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            confidence: confidence.into(),
            source: source.into(),
            timestamp: Utc::now(),
            tags: HashSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<SignalValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_expected_fields() {
        let s = Signal::new("quality.sharpness", 120.0, 0.8, "BlurWave")
            .with_tags(["heuristic".to_string()])
            .with_metadata("method", "laplacian_variance");

        assert_eq!(s.key, "quality.sharpness");
        assert_eq!(s.value.as_double(), Some(120.0));
        assert_eq!(s.confidence.value(), 0.8);
        assert!(s.tags.contains("heuristic"));
        assert_eq!(
            s.metadata.get("method").and_then(|v| v.as_str()),
            Some("laplacian_variance")
        );
    }
}
