//! Blackboard - shared per-image mutable container (spec.md §4.1).
//!
//! Append-only: writes from concurrent waves never delete or mutate an
//! existing entry. Grounded on the teacher's pattern of wrapping shared
//! mutable state behind a concurrent map rather than a single global lock
//! (`dashmap`, as used for the workflow-engine hot path in the pack).

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::decode::DecodedImage;
use crate::signal::Signal;

/// Per-image shared state that waves read from and write to.
#[derive(Clone)]
pub struct Blackboard {
    inner: Arc<BlackboardInner>,
}

struct BlackboardInner {
    image_path: std::path::PathBuf,
    image: Option<DecodedImage>,
    is_animated: bool,
    signals: DashMap<String, Vec<Signal>>,
}

impl Blackboard {
    pub fn new(image_path: impl Into<std::path::PathBuf>, image: Option<DecodedImage>) -> Self {
        let is_animated = image.as_ref().is_some_and(|i| i.is_animated);
        Self {
            inner: Arc::new(BlackboardInner {
                image_path: image_path.into(),
                image,
                is_animated,
                signals: DashMap::new(),
            }),
        }
    }

    pub fn image_path(&self) -> &std::path::Path {
        &self.inner.image_path
    }

    pub fn image(&self) -> Option<&DecodedImage> {
        self.inner.image.as_ref()
    }

    pub fn is_animated(&self) -> bool {
        self.inner.is_animated
    }

    /// Append a signal under its key. Never overwrites or removes prior
    /// writes for the same key.
    pub fn write(&self, signal: Signal) {
        self.inner
            .signals
            .entry(signal.key.clone())
            .or_default()
            .push(signal);
    }

    /// The highest-confidence signal for `key`, breaking ties by the latest
    /// timestamp.
    pub fn read_best(&self, key: &str) -> Option<Signal> {
        self.inner.signals.get(key).and_then(|entries| {
            entries
                .iter()
                .max_by(|a, b| {
                    a.confidence
                        .value()
                        .partial_cmp(&b.confidence.value())
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.timestamp.cmp(&b.timestamp))
                })
                .cloned()
        })
    }

    /// All signals ever written for `key`, in write order.
    pub fn read_all(&self, key: &str) -> Vec<Signal> {
        self.inner
            .signals
            .get(key)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner
            .signals
            .get(key)
            .is_some_and(|entries| !entries.is_empty())
    }

    /// Every key currently populated, for trigger evaluation and the merger.
    pub fn keys(&self) -> Vec<String> {
        self.inner.signals.iter().map(|e| e.key().clone()).collect()
    }

    /// An immutable point-in-time view, safe to hand to concurrent readers.
    pub fn snapshot(&self) -> BlackboardSnapshot {
        let mut map = BTreeMap::new();
        for entry in self.inner.signals.iter() {
            map.insert(entry.key().clone(), entry.value().clone());
        }
        BlackboardSnapshot { signals: map }
    }
}

/// Immutable snapshot of the blackboard at a point in time.
#[derive(Debug, Clone, Default)]
pub struct BlackboardSnapshot {
    signals: BTreeMap<String, Vec<Signal>>,
}

impl BlackboardSnapshot {
    pub fn read_best(&self, key: &str) -> Option<&Signal> {
        self.signals.get(key).and_then(|entries| {
            entries.iter().max_by(|a, b| {
                a.confidence
                    .value()
                    .partial_cmp(&b.confidence.value())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.timestamp.cmp(&b.timestamp))
            })
        })
    }

    pub fn read_all(&self, key: &str) -> &[Signal] {
        self.signals.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has(&self, key: &str) -> bool {
        self.signals.get(key).is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;

    #[test]
    fn append_only_retains_every_write() {
        let bb = Blackboard::new("/tmp/a.jpg", None);
        bb.write(Signal::new("quality.sharpness", 100.0, 0.5, "BlurWave"));
        bb.write(Signal::new("quality.sharpness", 150.0, 0.9, "BlurWave"));

        let all = bb.read_all("quality.sharpness");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn read_best_prefers_higher_confidence() {
        let bb = Blackboard::new("/tmp/a.jpg", None);
        bb.write(Signal::new("content.type_confidence", 0.4, 0.4, "TypeWave"));
        bb.write(Signal::new("content.type_confidence", 0.9, 0.9, "TypeWave"));

        let best = bb.read_best("content.type_confidence").unwrap();
        assert_eq!(best.value.as_double(), Some(0.9));
    }

    #[test]
    fn has_is_false_for_unwritten_key() {
        let bb = Blackboard::new("/tmp/a.jpg", None);
        assert!(!bb.has("color.palette"));
    }
}
