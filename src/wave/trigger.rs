//! Composable trigger expressions over the blackboard (spec.md §4.3).

use serde::{Deserialize, Serialize};

use crate::blackboard::BlackboardSnapshot;
use crate::signal::SignalValue;

/// A condition gating whether a wave is eligible to run in a given round.
/// A wave with no triggers is eligible immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerCondition {
    SignalExists { signal: String },
    SignalEquals { signal: String, value: SignalValue },
    SignalGreaterThan { signal: String, value: f64 },
    AllOf { conditions: Vec<TriggerCondition> },
    AnyOf { conditions: Vec<TriggerCondition> },
}

impl TriggerCondition {
    pub fn evaluate(&self, blackboard: &BlackboardSnapshot) -> bool {
        match self {
            TriggerCondition::SignalExists { signal } => blackboard.has(signal),
            TriggerCondition::SignalEquals { signal, value } => blackboard
                .read_best(signal)
                .is_some_and(|s| &s.value == value),
            TriggerCondition::SignalGreaterThan { signal, value } => blackboard
                .read_best(signal)
                .and_then(|s| s.value.as_double())
                .is_some_and(|v| v > *value),
            TriggerCondition::AllOf { conditions } => {
                conditions.iter().all(|c| c.evaluate(blackboard))
            }
            TriggerCondition::AnyOf { conditions } => {
                conditions.iter().any(|c| c.evaluate(blackboard))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::signal::Signal;

    fn snapshot_with(signals: Vec<Signal>) -> BlackboardSnapshot {
        let bb = Blackboard::new("/tmp/x.jpg", None);
        for s in signals {
            bb.write(s);
        }
        bb.snapshot()
    }

    #[test]
    fn signal_exists_respects_blackboard() {
        let snap = snapshot_with(vec![Signal::new("identity.sha256", "abc", 1.0, "IdentityWave")]);
        assert!(TriggerCondition::SignalExists {
            signal: "identity.sha256".into()
        }
        .evaluate(&snap));
        assert!(!TriggerCondition::SignalExists {
            signal: "content.type".into()
        }
        .evaluate(&snap));
    }

    #[test]
    fn greater_than_compares_numeric_value() {
        let snap = snapshot_with(vec![Signal::new("quality.sharpness", 120.0, 0.8, "BlurWave")]);
        assert!(TriggerCondition::SignalGreaterThan {
            signal: "quality.sharpness".into(),
            value: 100.0
        }
        .evaluate(&snap));
        assert!(!TriggerCondition::SignalGreaterThan {
            signal: "quality.sharpness".into(),
            value: 200.0
        }
        .evaluate(&snap));
    }

    #[test]
    fn all_of_requires_every_condition() {
        let snap = snapshot_with(vec![Signal::new("content.type_confidence", 0.9, 0.9, "TypeWave")]);
        let cond = TriggerCondition::AllOf {
            conditions: vec![
                TriggerCondition::SignalExists {
                    signal: "content.type_confidence".into(),
                },
                TriggerCondition::SignalGreaterThan {
                    signal: "content.type_confidence".into(),
                    value: 0.5,
                },
            ],
        };
        assert!(cond.evaluate(&snap));
    }

    #[test]
    fn any_of_with_no_conditions_is_vacuously_false() {
        let snap = snapshot_with(vec![]);
        let cond = TriggerCondition::AnyOf { conditions: vec![] };
        assert!(!cond.evaluate(&snap));
    }
}
