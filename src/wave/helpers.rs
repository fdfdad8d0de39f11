//! Free helper functions for building contributions (spec.md §9: replaces
//! the inheritance-chain helper methods with plain functions).

use crate::contribution::DetectionContribution;
use crate::signal::{Confidence, Signal};

/// A confidence band a heuristic wave reports itself against, used to
/// derive a sane `confidence_delta` without every wave hand-rolling the math.
#[derive(Debug, Clone, Copy)]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    fn delta(self) -> f64 {
        match self {
            ConfidenceBand::Low => -0.2,
            ConfidenceBand::Medium => 0.1,
            ConfidenceBand::High => 0.35,
        }
    }
}

/// Build a contribution from a confidence band, a salience, and the signals
/// produced. This is the common case for a heuristic wave's happy path.
pub fn make_contribution(
    detector: impl Into<String>,
    category: impl Into<String>,
    band: ConfidenceBand,
    salience: f64,
    reason: impl Into<String>,
    signals: Vec<Signal>,
) -> DetectionContribution {
    DetectionContribution::new(detector, category)
        .with_delta(band.delta())
        .with_salience(salience)
        .with_weight(1.0)
        .with_reason(reason)
        .signals_from(signals)
}

/// A neutral, low-confidence info contribution for a wave that failed or
/// timed out (spec.md §4.3 step 4, §7 "recoverable" kind).
pub fn info_contribution(detector: impl Into<String>, reason: impl Into<String>) -> DetectionContribution {
    DetectionContribution::new(detector, "info")
        .with_delta(0.0)
        .with_salience(0.0)
        .with_weight(0.0)
        .with_reason(reason)
}

/// A zero-confidence signal marking that a value could not be determined.
pub fn unknown_signal(key: impl Into<String>, source: impl Into<String>) -> Signal {
    Signal::new(key, "unknown", Confidence::ZERO, source)
}

impl DetectionContribution {
    fn signals_from(mut self, signals: Vec<Signal>) -> Self {
        self.signals = signals;
        self
    }
}
