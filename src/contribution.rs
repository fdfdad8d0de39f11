//! DetectionContribution and the signal/contribution merger (spec.md §4.2).

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::signal::Signal;

/// What a wave returns from a single `contribute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionContribution {
    pub detector: String,
    pub category: String,
    /// In `[-0.5, 0.5]`.
    pub confidence_delta: f64,
    pub weight: f64,
    /// In `[0, 1]`.
    pub salience: f64,
    pub reason: String,
    pub signals: Vec<Signal>,
    pub trigger_early_exit: bool,
    pub early_exit_verdict: Option<String>,
}

impl DetectionContribution {
    pub fn new(detector: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            detector: detector.into(),
            category: category.into(),
            confidence_delta: 0.0,
            weight: 1.0,
            salience: 0.0,
            reason: String::new(),
            signals: Vec::new(),
            trigger_early_exit: false,
            early_exit_verdict: None,
        }
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.confidence_delta = delta.clamp(-0.5, 0.5);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.max(0.0);
        self
    }

    pub fn with_salience(mut self, salience: f64) -> Self {
        self.salience = salience.clamp(0.0, 1.0);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_early_exit(mut self, verdict: impl Into<String>) -> Self {
        self.trigger_early_exit = true;
        self.early_exit_verdict = Some(verdict.into());
        self
    }
}

/// The outcome of merging every completed wave's contributions (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct MergedResult {
    /// Per-key winning value, chosen by highest `weight * salience`, ties
    /// broken by latest timestamp.
    pub signals: BTreeMap<String, Signal>,
    pub confidence: f64,
    pub completed_waves: HashSet<String>,
}

/// Merge every contribution from completed waves into one result
/// (spec.md §4.2). Waves that errored never contribute; `completed_waves` is
/// the set of wave names whose `contribute` returned without error.
pub fn merge(contributions: &[DetectionContribution]) -> MergedResult {
    let mut best: BTreeMap<String, (f64, Signal)> = BTreeMap::new();
    let mut completed_waves = HashSet::new();
    let mut weighted_sum = 0.0;
    let mut salience_sum = 0.0;

    for contribution in contributions {
        completed_waves.insert(contribution.detector.clone());

        let rank = contribution.weight * contribution.salience;
        for signal in &contribution.signals {
            let replace = match best.get(&signal.key) {
                None => true,
                Some((existing_rank, existing_signal)) => {
                    rank > *existing_rank
                        || (rank == *existing_rank && signal.timestamp >= existing_signal.timestamp)
                }
            };
            if replace {
                best.insert(signal.key.clone(), (rank, signal.clone()));
            }
        }

        weighted_sum += contribution.salience * (0.5 + contribution.confidence_delta);
        salience_sum += contribution.salience;
    }

    let confidence = if salience_sum == 0.0 {
        0.5
    } else {
        (weighted_sum / salience_sum).clamp(0.0, 1.0)
    };

    MergedResult {
        signals: best.into_iter().map(|(k, (_, s))| (k, s)).collect(),
        confidence,
        completed_waves,
    }
}
