//! Escalation (spec.md §4.8): deciding whether to call the Vision LLM and/or
//! OCR, and composing the prompt/caption pipeline around those calls.

pub mod prompt;

use async_trait::async_trait;

use crate::motion::SceneResult;
use crate::orchestrator::ImageAnalysisResult;
use crate::signal::taxonomy::ContentType;

/// External collaborator: a vision-capable LLM (spec.md §4.8, §6 non-goal -
/// the core never implements the model call itself).
#[async_trait]
pub trait VisionLlmClient: Send + Sync {
    async fn analyze(&self, image: &crate::decode::DecodedImage, prompt: &str) -> VisionLlmResponse;
}

#[derive(Debug, Clone, Default)]
pub struct VisionLlmResponse {
    pub success: bool,
    pub caption: Option<String>,
    pub error: Option<String>,
    pub model: String,
    pub claims: Vec<String>,
    pub enhanced_metadata: std::collections::BTreeMap<String, String>,
}

/// External collaborator: an OCR engine.
#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn extract_text(&self, image: &crate::decode::DecodedImage, frame_index: usize) -> Option<String>;
}

/// What [`decide`] recommends for a completed analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationDecision {
    pub escalate_to_vision_llm: bool,
    pub escalate_to_ocr: bool,
    pub ocr_frame_indices: Vec<usize>,
}

/// spec.md §4.8 escalation rules. `scene_result` is `Some` only for animated
/// inputs that ran through the Motion & Scene Detector; `text_change_frames`
/// is whatever it (or `detect_unique_text_frames`) already identified.
pub fn decide(
    result: &ImageAnalysisResult,
    scene_result: Option<&SceneResult>,
    text_change_frames: &[usize],
) -> EscalationDecision {
    let type_confidence = result
        .signals
        .signals
        .get(crate::signal::taxonomy::CONTENT_TYPE_CONFIDENCE)
        .and_then(|s| s.value.as_double())
        .unwrap_or(1.0);
    let sharpness = result
        .signals
        .signals
        .get(crate::signal::taxonomy::QUALITY_SHARPNESS)
        .and_then(|s| s.value.as_double())
        .unwrap_or(f64::MAX);
    let text_likeliness = result
        .signals
        .signals
        .get(crate::signal::taxonomy::CONTENT_TEXT_LIKELINESS)
        .and_then(|s| s.value.as_double())
        .unwrap_or(0.0);
    let detected_type = result
        .signals
        .signals
        .get(crate::signal::taxonomy::CONTENT_TYPE)
        .and_then(|s| s.value.as_str())
        .and_then(|s| s.parse::<ContentType>().ok())
        .unwrap_or_default();
    let animated_scene_count = scene_result.map(|s| s.scene_count).unwrap_or(0);

    let escalate_to_vision_llm = type_confidence < 0.7
        || sharpness < 300.0
        || text_likeliness > 0.4
        || matches!(detected_type, ContentType::Diagram | ContentType::Chart)
        || animated_scene_count > 2;

    let escalate_to_ocr = text_likeliness >= 0.4;
    let ocr_frame_indices = if escalate_to_ocr && scene_result.is_some() {
        text_change_frames.to_vec()
    } else {
        Vec::new()
    };

    EscalationDecision {
        escalate_to_vision_llm,
        escalate_to_ocr,
        ocr_frame_indices,
    }
}

/// Strip well-known prompt-leakage preambles, trim quotes, capitalize the
/// first letter, and truncate to `max_len` on a sentence or word boundary
/// (spec.md §4.8 caption post-processing).
pub fn postprocess_caption(raw: &str, max_len: usize) -> String {
    const PREAMBLES: &[&str] = &[
        "here is a caption:",
        "here's a caption:",
        "caption:",
        "sure, here you go:",
        "the image shows",
    ];

    let mut text = raw.trim();
    for preamble in PREAMBLES {
        if text.to_lowercase().starts_with(preamble) {
            text = text[preamble.len()..].trim_start();
        }
    }
    let trimmed = text.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());

    let mut capitalized = String::with_capacity(trimmed.len());
    let mut chars = trimmed.chars();
    if let Some(first) = chars.next() {
        capitalized.extend(first.to_uppercase());
        capitalized.push_str(chars.as_str());
    }

    truncate_on_boundary(&capitalized, max_len)
}

fn truncate_on_boundary(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_len).collect();
    if let Some(sentence_end) = truncated.rfind(['.', '!', '?']) {
        return truncated[..=sentence_end].to_string();
    }
    if let Some(space) = truncated.rfind(' ') {
        return truncated[..space].to_string();
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::merge;

    fn result_with_sharpness(sharpness: f64) -> ImageAnalysisResult {
        let contribution = crate::contribution::DetectionContribution::new("BlurWave", "quality")
            .with_salience(1.0)
            .with_signal(crate::signal::Signal::new(
                crate::signal::taxonomy::QUALITY_SHARPNESS,
                sharpness,
                0.8,
                "BlurWave",
            ));
        let merged = merge(&[contribution]);
        ImageAnalysisResult {
            confidence: merged.confidence,
            caption: None,
            ocr_text: None,
            dominant_color: None,
            completed_waves: merged.completed_waves.clone(),
            signals: merged,
            early_exit: false,
            early_exit_reason: None,
        }
    }

    #[test]
    fn low_sharpness_triggers_vision_escalation() {
        let result = result_with_sharpness(50.0);
        let decision = decide(&result, None, &[]);
        assert!(decision.escalate_to_vision_llm);
    }

    #[test]
    fn sharp_image_with_no_text_does_not_escalate() {
        let result = result_with_sharpness(1000.0);
        let decision = decide(&result, None, &[]);
        assert!(!decision.escalate_to_vision_llm);
        assert!(!decision.escalate_to_ocr);
    }

    #[test]
    fn strips_known_preamble_and_capitalizes() {
        let out = postprocess_caption("Here is a caption: \"a red bicycle\"", 125);
        assert_eq!(out, "A red bicycle");
    }

    #[test]
    fn truncates_on_word_boundary_under_limit() {
        let long = "a ".repeat(80) + "final word here.";
        let out = postprocess_caption(&long, 20);
        assert!(out.chars().count() <= 20);
        assert!(!out.ends_with(' '));
    }
}
