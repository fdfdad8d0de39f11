//! Discriminator & Effectiveness Tracker (spec.md §4.9): scores a finished
//! analysis across six vectors and learns which signals are reliable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::contribution::MergedResult;
use crate::motion::SceneResult;

const DEFAULT_DECAY_RATE: f64 = 0.95;
const DEFAULT_PRUNE_THRESHOLD: f64 = 0.1;

/// Inputs the discriminator scores (spec.md §4.9: `profile, motion?,
/// vision_result?, ocr_text?, goal`).
pub struct DiscriminatorInput<'a> {
    pub image_hash: &'a str,
    pub image_type: &'a str,
    pub signals: &'a MergedResult,
    pub scene_result: Option<&'a SceneResult>,
    pub vision_caption: Option<&'a str>,
    pub ocr_text: Option<&'a str>,
    pub goal: &'a str,
    pub prior_scores_for_image: &'a [DiscriminatorScore],
}

/// The per-signal strength recorded while computing a vector, used
/// afterward to derive `agreement`.
#[derive(Debug, Clone)]
pub struct SignalContribution {
    pub signal_name: String,
    pub vectors_touched: Vec<&'static str>,
    pub strength: f64,
    pub agreement: f64,
}

/// Output of a single discriminator pass (spec.md §3 `DiscriminatorScore`).
#[derive(Debug, Clone)]
pub struct DiscriminatorScore {
    pub id: String,
    pub image_hash: String,
    pub image_type: String,
    pub goal: String,
    pub ocr_fidelity: f64,
    pub motion_agreement: f64,
    pub palette_consistency: f64,
    pub structural_alignment: f64,
    pub grounding_completeness: f64,
    pub novelty_vs_prior: f64,
    pub overall_score: f64,
    pub signal_contributions: Vec<SignalContribution>,
    /// Caption length at the time of this pass, carried forward so a later
    /// `score()` call can compare against it via `prior_scores_for_image`
    /// without re-deriving it from the (by-then-overwritten) caption signal.
    pub caption_len: Option<usize>,
    pub timestamp: DateTime<Utc>,
    pub accepted: Option<bool>,
    pub feedback: Option<String>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn alphanumeric_ratio(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let alnum = words.iter().filter(|w| w.chars().all(|c| c.is_alphanumeric())).count();
    alnum as f64 / words.len() as f64
}

/// Runs the full six-vector scoring pass (spec.md §4.9).
pub fn score(input: &DiscriminatorInput<'_>) -> DiscriminatorScore {
    let text_likeliness = input
        .signals
        .signals
        .get(crate::signal::taxonomy::CONTENT_TEXT_LIKELINESS)
        .and_then(|s| s.value.as_double())
        .unwrap_or(0.0);
    let caption_mentions = |needle: &str| {
        input
            .vision_caption
            .map(|c| c.to_lowercase().contains(needle))
            .unwrap_or(false)
    };

    let ocr_fidelity = mean(&[
        text_likeliness,
        input.ocr_text.map(|t| (t.len() as f64 / 500.0).min(1.0)).unwrap_or(0.0),
        input.ocr_text.map(|t| alphanumeric_ratio(t)).unwrap_or(0.0),
        if caption_mentions("text") { 1.0 } else { 0.0 },
    ]);

    let motion_confidence = input
        .signals
        .signals
        .get(crate::signal::taxonomy::MOTION_MAGNITUDE)
        .map(|s| s.confidence.value())
        .unwrap_or(0.0);
    let motion_magnitude = input
        .signals
        .signals
        .get(crate::signal::taxonomy::MOTION_MAGNITUDE)
        .and_then(|s| s.value.as_double())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let motion_coverage = input.scene_result.map(|s| s.average_motion.min(1.0)).unwrap_or(0.0);
    let motion_agreement = mean(&[
        motion_confidence,
        motion_magnitude,
        motion_coverage,
        if caption_mentions("anima") || caption_mentions("moving") || caption_mentions("motion") {
            1.0
        } else {
            0.0
        },
    ]);

    let top3_coverage = input
        .signals
        .signals
        .get(crate::signal::taxonomy::COLOR_DOMINANT_PERCENTAGES)
        .and_then(|s| s.value.as_string_list())
        .map(|percentages| {
            percentages
                .iter()
                .filter_map(|p| p.parse::<f64>().ok())
                .sum::<f64>()
                .min(1.0)
        })
        .unwrap_or(0.0);
    let saturation_consistency = input
        .signals
        .signals
        .get(crate::signal::taxonomy::COLOR_MEAN_SATURATION)
        .map(|s| s.confidence.value())
        .unwrap_or(0.0);
    let grayscale_confidence = input
        .signals
        .signals
        .get(crate::signal::taxonomy::COLOR_IS_MOSTLY_GRAYSCALE)
        .map(|s| s.confidence.value())
        .unwrap_or(0.0);
    let mentions_color = input
        .signals
        .signals
        .get(crate::signal::taxonomy::COLOR_DOMINANT_NAMES)
        .and_then(|s| s.value.as_string_list())
        .map(|names| names.iter().any(|n| caption_mentions(n)))
        .unwrap_or(false);
    let palette_consistency = mean(&[
        top3_coverage,
        saturation_consistency,
        grayscale_confidence,
        if mentions_color { 1.0 } else { 0.0 },
    ]);

    let edge_density = input
        .signals
        .signals
        .get(crate::signal::taxonomy::QUALITY_EDGE_DENSITY)
        .and_then(|s| s.value.as_double())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let sharpness_bucket = input
        .signals
        .signals
        .get(crate::signal::taxonomy::QUALITY_SHARPNESS)
        .and_then(|s| s.value.as_double())
        .map(|v| (v / 1000.0).min(1.0))
        .unwrap_or(0.0);
    let aspect_ratio_sane = input
        .signals
        .signals
        .get(crate::signal::taxonomy::IDENTITY_ASPECT_RATIO)
        .and_then(|s| s.value.as_double())
        .map(|v| if (0.3..=3.0).contains(&v) { 1.0 } else { 0.0 })
        .unwrap_or(0.0);
    let entropy_normalized = input
        .signals
        .signals
        .get(crate::signal::taxonomy::QUALITY_LUMINANCE_ENTROPY)
        .and_then(|s| s.value.as_double())
        .map(|v| (v / 8.0).clamp(0.0, 1.0))
        .unwrap_or(0.0);
    let structural_alignment = mean(&[edge_density, sharpness_bucket, aspect_ratio_sane, entropy_normalized]);

    // No structured claims model ships in this core (spec.md §6 non-goal for
    // the Vision LLM's richer claim extraction); grounding completeness is
    // 0 without a caption and a conservative 0.5 once one is present.
    let grounding_completeness = if input.vision_caption.is_none() { 0.0 } else { 0.5 };

    // The current-score proxy below intentionally omits novelty_vs_prior
    // itself - it isn't known yet - so it's the mean of the other five
    // vectors, not the final overall_score.
    let current_provisional_score = mean(&[
        ocr_fidelity,
        motion_agreement,
        palette_consistency,
        structural_alignment,
        grounding_completeness,
    ]);
    let current_caption_len = input.vision_caption.map(|c| c.len() as f64).unwrap_or(0.0);

    let novelty_vs_prior = if input.prior_scores_for_image.is_empty() {
        1.0
    } else {
        let prior_mean_score = mean(
            &input
                .prior_scores_for_image
                .iter()
                .map(|s| s.overall_score)
                .collect::<Vec<_>>(),
        );
        let prior_caption_lens: Vec<f64> = input
            .prior_scores_for_image
            .iter()
            .filter_map(|s| s.caption_len)
            .map(|len| len as f64)
            .collect();
        let length_divergence = if prior_caption_lens.is_empty() {
            0.0
        } else {
            let prior_caption_len = mean(&prior_caption_lens);
            if prior_caption_len == 0.0 {
                0.0
            } else {
                ((current_caption_len - prior_caption_len).abs() / prior_caption_len).min(1.0)
            }
        };
        let score_divergence = (current_provisional_score - prior_mean_score).abs().min(1.0);
        mean(&[length_divergence, score_divergence])
    };

    let vectors = [
        ocr_fidelity,
        motion_agreement,
        palette_consistency,
        structural_alignment,
        grounding_completeness,
        novelty_vs_prior,
    ];
    let overall_score = mean(&vectors);

    let mut contributions = vec![
        SignalContribution {
            signal_name: crate::signal::taxonomy::CONTENT_TEXT_LIKELINESS.to_string(),
            vectors_touched: vec!["ocr_fidelity"],
            strength: text_likeliness,
            agreement: 1.0,
        },
        SignalContribution {
            signal_name: crate::signal::taxonomy::QUALITY_EDGE_DENSITY.to_string(),
            vectors_touched: vec!["structural_alignment"],
            strength: edge_density,
            agreement: 1.0,
        },
        SignalContribution {
            signal_name: crate::signal::taxonomy::COLOR_MEAN_SATURATION.to_string(),
            vectors_touched: vec!["palette_consistency"],
            strength: saturation_consistency,
            agreement: 1.0,
        },
    ];
    apply_peer_agreement(&mut contributions);

    DiscriminatorScore {
        id: Uuid::new_v4().to_string(),
        image_hash: input.image_hash.to_string(),
        image_type: input.image_type.to_string(),
        goal: input.goal.to_string(),
        ocr_fidelity,
        motion_agreement,
        palette_consistency,
        structural_alignment,
        grounding_completeness,
        novelty_vs_prior,
        overall_score,
        signal_contributions: contributions,
        caption_len: input.vision_caption.map(str::len),
        timestamp: Utc::now(),
        accepted: None,
        feedback: None,
    }
}

/// `agreement = 1 - |strength - mean(peer_strengths_in_same_vectors)|`;
/// solo signals (no other contribution touches any shared vector) get 1.0.
fn apply_peer_agreement(contributions: &mut [SignalContribution]) {
    let snapshot: Vec<(Vec<&'static str>, f64)> = contributions
        .iter()
        .map(|c| (c.vectors_touched.clone(), c.strength))
        .collect();

    for (i, contribution) in contributions.iter_mut().enumerate() {
        let peers: Vec<f64> = snapshot
            .iter()
            .enumerate()
            .filter(|(j, (vectors, _))| *j != i && vectors.iter().any(|v| contribution.vectors_touched.contains(v)))
            .map(|(_, (_, strength))| *strength)
            .collect();
        contribution.agreement = if peers.is_empty() {
            1.0
        } else {
            1.0 - (contribution.strength - mean(&peers)).abs()
        };
    }
}

/// Per-`(signal_name, image_type, goal)` learned reliability weight
/// (spec.md §4.9 feedback loop).
#[derive(Debug, Clone)]
pub struct DiscriminatorEffectiveness {
    pub signal_name: String,
    pub image_type: String,
    pub goal: String,
    pub weight: f64,
    pub prior_evaluations: u32,
    pub last_evaluated_at: DateTime<Utc>,
}

impl DiscriminatorEffectiveness {
    pub fn new(signal_name: impl Into<String>, image_type: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            signal_name: signal_name.into(),
            image_type: image_type.into(),
            goal: goal.into(),
            weight: 1.0,
            prior_evaluations: 0,
            last_evaluated_at: Utc::now(),
        }
    }

    /// `weight * decay_rate^days_since_last_evaluated`.
    pub fn weight_decayed(&self, now: DateTime<Utc>, decay_rate: f64) -> f64 {
        let days = (now - self.last_evaluated_at).num_seconds().max(0) as f64 / 86_400.0;
        self.weight * decay_rate.powf(days)
    }

    /// Whether this effectiveness record should be retired.
    pub fn should_prune(&self, now: DateTime<Utc>, decay_rate: f64, prune_threshold: f64) -> bool {
        self.weight_decayed(now, decay_rate) < prune_threshold
    }

    /// Applies one feedback observation, returning the updated weight.
    pub fn apply_feedback(&mut self, agreed: bool, now: DateTime<Utc>) -> f64 {
        let decayed = self.weight_decayed(now, DEFAULT_DECAY_RATE);
        let learning_rate = 1.0 / ((self.prior_evaluations as f64 + 1.0).sqrt());
        let delta = if agreed { learning_rate } else { -learning_rate };
        self.weight = (decayed + delta).clamp(0.0, 2.0);
        self.prior_evaluations += 1;
        self.last_evaluated_at = now;
        self.weight
    }
}

/// Rules for whether a signal's contribution "agreed" with the human
/// feedback on a score (spec.md §4.9): high-strength signals for accepted
/// high-score results agree; low-strength signals for rejected low-score
/// results agree; anything else is a contradiction.
pub fn did_signal_agree(contribution: &SignalContribution, accepted: bool, overall_score: f64) -> bool {
    const HIGH: f64 = 0.6;
    const LOW: f64 = 0.4;
    let high_score = overall_score >= HIGH;
    let low_score = overall_score <= LOW;

    if accepted && high_score && contribution.strength >= HIGH {
        return true;
    }
    if !accepted && low_score && contribution.strength <= LOW {
        return true;
    }
    false
}

/// Append-only feedback record (spec.md §4.9 "immutable ledger").
#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    pub score_id: String,
    pub accepted: bool,
    pub text: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Records feedback against a ledger and updates the effectiveness map for
/// every signal the score touched, retiring any that decay below threshold.
pub fn record_feedback(
    ledger: &mut Vec<FeedbackRecord>,
    effectiveness: &mut BTreeMap<(String, String, String), DiscriminatorEffectiveness>,
    score: &DiscriminatorScore,
    accepted: bool,
    text: Option<String>,
    image_type: &str,
    goal: &str,
) {
    let now = Utc::now();
    ledger.push(FeedbackRecord {
        score_id: score.id.clone(),
        accepted,
        text,
        recorded_at: now,
    });

    let mut to_prune = Vec::new();
    for contribution in &score.signal_contributions {
        let key = (contribution.signal_name.clone(), image_type.to_string(), goal.to_string());
        let entry = effectiveness
            .entry(key.clone())
            .or_insert_with(|| DiscriminatorEffectiveness::new(&contribution.signal_name, image_type, goal));
        let agreed = did_signal_agree(contribution, accepted, score.overall_score);
        entry.apply_feedback(agreed, now);
        if entry.should_prune(now, DEFAULT_DECAY_RATE, DEFAULT_PRUNE_THRESHOLD) {
            to_prune.push(key);
        }
    }
    for key in to_prune {
        effectiveness.remove(&key);
    }
}
