//! Contradiction rules (spec.md §6 "Contradiction wave", §9 precedence rule).
//!
//! A rule flags two blackboard signals as mutually inconsistent. Resolution
//! picks a single `(ContradictionStatus, ResolutionStrategy)` pair for the
//! whole blackboard: the highest-severity matching rule wins, ties broken by
//! `PreferHigherConfidence` (spec.md §9 open question, resolved).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::blackboard::{Blackboard, BlackboardSnapshot};
use crate::contribution::DetectionContribution;
use crate::signal::taxonomy::{self, ContentType, ContradictionStatus};
use crate::signal::{Confidence, Signal};
use crate::wave::helpers::make_contribution;
use crate::wave::trigger::TriggerCondition;
use crate::wave::Wave;

/// How a contradiction should be resolved once detected, mirroring the
/// manifest's `resolution` field (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Keep whichever of the two conflicting signals has higher confidence.
    PreferHigherConfidence,
    /// Keep whichever was written most recently.
    PreferMostRecent,
    /// Neither signal is dropped; the conflict is only recorded.
    Flag,
}

/// A single named contradiction check over the blackboard.
pub struct ContradictionRule {
    pub name: &'static str,
    pub severity: ContradictionStatus,
    pub resolution: ResolutionStrategy,
    pub description: &'static str,
    check: fn(&BlackboardSnapshot) -> bool,
}

/// A rule that matched the current blackboard state.
#[derive(Debug, Clone)]
pub struct ContradictionFinding {
    pub rule_name: &'static str,
    pub severity: ContradictionStatus,
    pub resolution: ResolutionStrategy,
}

fn grayscale_but_colorful(blackboard: &BlackboardSnapshot) -> bool {
    let is_grayscale = blackboard
        .read_best(taxonomy::COLOR_IS_MOSTLY_GRAYSCALE)
        .and_then(|s| s.value.as_bool())
        .unwrap_or(false);
    let has_chroma = blackboard
        .read_best(taxonomy::COLOR_DOMINANT_NAMES)
        .and_then(|s| s.value.as_string_list())
        .is_some_and(|names| names.iter().any(|n| !matches!(n.as_str(), "black" | "white" | "gray")));
    is_grayscale && has_chroma
}

fn photo_with_heavy_text(blackboard: &BlackboardSnapshot) -> bool {
    let detected_photo = blackboard
        .read_best(taxonomy::CONTENT_TYPE)
        .and_then(|s| s.value.as_str())
        .map(|s| s == ContentType::Photo.as_str())
        .unwrap_or(false);
    let text_likeliness = blackboard
        .read_best(taxonomy::CONTENT_TEXT_LIKELINESS)
        .and_then(|s| s.value.as_double())
        .unwrap_or(0.0);
    detected_photo && text_likeliness > 0.6
}

fn confident_type_but_blurry(blackboard: &BlackboardSnapshot) -> bool {
    let type_confidence = blackboard
        .read_best(taxonomy::CONTENT_TYPE_CONFIDENCE)
        .and_then(|s| s.value.as_double())
        .unwrap_or(0.0);
    let sharpness = blackboard
        .read_best(taxonomy::QUALITY_SHARPNESS)
        .and_then(|s| s.value.as_double());
    type_confidence > 0.75 && sharpness.is_some_and(|v| v < 10.0)
}

/// Built-in rules, checked in the order listed; severity determines which
/// finding wins when more than one matches.
pub const RULES: &[ContradictionRule] = &[
    ContradictionRule {
        name: "GrayscaleButColorful",
        severity: ContradictionStatus::Warning,
        resolution: ResolutionStrategy::PreferHigherConfidence,
        description: "color.is_mostly_grayscale is true but a chromatic color dominates the palette",
        check: grayscale_but_colorful,
    },
    ContradictionRule {
        name: "PhotoWithHeavyText",
        severity: ContradictionStatus::Info,
        resolution: ResolutionStrategy::Flag,
        description: "content.type is Photo but text_likeliness is high enough to suggest a screenshot or meme",
        check: photo_with_heavy_text,
    },
    ContradictionRule {
        name: "ConfidentTypeButBlurry",
        severity: ContradictionStatus::Error,
        resolution: ResolutionStrategy::PreferHigherConfidence,
        description: "content.type_confidence is high despite near-zero sharpness, which should have suppressed it",
        check: confident_type_but_blurry,
    },
];

/// Runs every rule, returning every match (spec.md §4.9/§6: all findings are
/// recorded, only the resolution picks a single severity/strategy).
pub fn detect(blackboard: &BlackboardSnapshot) -> Vec<ContradictionFinding> {
    RULES
        .iter()
        .filter(|rule| (rule.check)(blackboard))
        .map(|rule| ContradictionFinding {
            rule_name: rule.name,
            severity: rule.severity,
            resolution: rule.resolution,
        })
        .collect()
}

/// Resolves a set of findings to one status/strategy pair (spec.md §9: "apply
/// the rule with the highest severity; on ties, apply
/// `PreferHigherConfidence`").
pub fn resolve(findings: &[ContradictionFinding]) -> (ContradictionStatus, ResolutionStrategy) {
    match findings.iter().max_by_key(|f| f.severity) {
        None => (ContradictionStatus::Clean, ResolutionStrategy::Flag),
        Some(worst) => {
            let tied_count = findings.iter().filter(|f| f.severity == worst.severity).count();
            if tied_count > 1 {
                (worst.severity, ResolutionStrategy::PreferHigherConfidence)
            } else {
                (worst.severity, worst.resolution)
            }
        }
    }
}

/// Scans the blackboard for known contradictions and emits
/// `validation.contradiction.{count,status}` (spec.md §6 taxonomy row).
pub struct ContradictionWave;

#[async_trait]
impl Wave for ContradictionWave {
    fn name(&self) -> &str {
        "ContradictionWave"
    }
    fn priority(&self) -> i32 {
        10
    }

    fn trigger_conditions(&self) -> &[TriggerCondition] {
        static TRIGGERS: std::sync::OnceLock<Vec<TriggerCondition>> = std::sync::OnceLock::new();
        TRIGGERS.get_or_init(|| {
            vec![TriggerCondition::SignalExists {
                signal: taxonomy::CONTENT_TYPE.to_string(),
            }]
        })
    }

    async fn contribute(
        &self,
        blackboard: &Blackboard,
        _cancel: CancellationToken,
    ) -> Vec<DetectionContribution> {
        let snapshot = blackboard.snapshot();
        let findings = detect(&snapshot);
        let (status, _resolution) = resolve(&findings);

        let status_str = match status {
            ContradictionStatus::Clean => "clean",
            ContradictionStatus::Info => "info",
            ContradictionStatus::Warning => "warning",
            ContradictionStatus::Error => "error",
            ContradictionStatus::Critical => "critical",
        };

        let signals = vec![
            Signal::new(
                taxonomy::VALIDATION_CONTRADICTION_COUNT,
                findings.len() as i64,
                Confidence::ONE,
                self.name(),
            ),
            Signal::new(
                taxonomy::VALIDATION_CONTRADICTION_STATUS,
                status_str,
                Confidence::ONE,
                self.name(),
            ),
        ];

        vec![make_contribution(
            self.name(),
            "validation",
            crate::wave::helpers::ConfidenceBand::Medium,
            0.3,
            "contradiction rule scan",
            signals,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_findings_resolve_to_clean() {
        let (status, _) = resolve(&[]);
        assert_eq!(status, ContradictionStatus::Clean);
    }

    #[test]
    fn highest_severity_wins() {
        let findings = vec![
            ContradictionFinding {
                rule_name: "a",
                severity: ContradictionStatus::Info,
                resolution: ResolutionStrategy::Flag,
            },
            ContradictionFinding {
                rule_name: "b",
                severity: ContradictionStatus::Critical,
                resolution: ResolutionStrategy::PreferMostRecent,
            },
        ];
        let (status, resolution) = resolve(&findings);
        assert_eq!(status, ContradictionStatus::Critical);
        assert_eq!(resolution, ResolutionStrategy::PreferMostRecent);
    }

    #[test]
    fn tied_severity_falls_back_to_prefer_higher_confidence() {
        let findings = vec![
            ContradictionFinding {
                rule_name: "a",
                severity: ContradictionStatus::Warning,
                resolution: ResolutionStrategy::Flag,
            },
            ContradictionFinding {
                rule_name: "b",
                severity: ContradictionStatus::Warning,
                resolution: ResolutionStrategy::PreferMostRecent,
            },
        ];
        let (status, resolution) = resolve(&findings);
        assert_eq!(status, ContradictionStatus::Warning);
        assert_eq!(resolution, ResolutionStrategy::PreferHigherConfidence);
    }

    #[tokio::test]
    async fn grayscale_but_colorful_is_flagged() {
        let bb = Blackboard::new("/tmp/a.png", None);
        bb.write(Signal::new(taxonomy::COLOR_IS_MOSTLY_GRAYSCALE, true, 1.0, "ColorWave"));
        bb.write(Signal::new(
            taxonomy::COLOR_DOMINANT_NAMES,
            vec!["red".to_string()],
            0.9,
            "ColorWave",
        ));
        bb.write(Signal::new(taxonomy::CONTENT_TYPE, "Photo", 0.8, "TypeWave"));

        let wave = ContradictionWave;
        let contributions = wave.contribute(&bb, CancellationToken::new()).await;
        let count = contributions[0]
            .signals
            .iter()
            .find(|s| s.key == taxonomy::VALIDATION_CONTRADICTION_COUNT)
            .unwrap()
            .value
            .as_int()
            .unwrap();
        assert!(count >= 1);
    }
}
