//! Prompt template composition (spec.md §4.8): builds the structured prompt
//! handed to the Vision LLM from the manifest's signal store, rather than a
//! single hardcoded template string.

use crate::contribution::MergedResult;
use crate::signal::taxonomy::{self, ContentType};

/// The caller-requested output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    AltText,
    Caption,
    Social,
}

impl OutputFormat {
    fn purpose_line(self) -> &'static str {
        match self {
            OutputFormat::AltText => "Produce WCAG-compliant alt text for a screen reader.",
            OutputFormat::Caption => "Produce a concise, neutral caption describing the image.",
            OutputFormat::Social => "Produce an engaging one-line caption suitable for a social post.",
        }
    }
}

/// Globs the signal store for the handful of keys most relevant to a
/// detected content type, so the prompt stays compact instead of dumping
/// every signal ever written.
fn high_weight_keys(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::Diagram | ContentType::Chart => &[
            taxonomy::CONTENT_TEXT_LIKELINESS,
            taxonomy::QUALITY_EDGE_DENSITY,
            taxonomy::COLOR_IS_MOSTLY_GRAYSCALE,
        ],
        ContentType::ScannedDocument => &[taxonomy::CONTENT_TEXT_LIKELINESS, taxonomy::COLOR_IS_MOSTLY_GRAYSCALE],
        ContentType::Meme => &[taxonomy::CONTENT_TEXT_LIKELINESS, taxonomy::COLOR_DOMINANT_NAMES],
        _ => &[
            taxonomy::COLOR_DOMINANT_NAMES,
            taxonomy::QUALITY_SHARPNESS,
            taxonomy::COLOR_MEAN_LUMINANCE,
        ],
    }
}

fn focus_line(content_type: ContentType) -> String {
    match content_type {
        ContentType::Diagram => "Focus on the structure and relationships depicted, not individual pixels.".into(),
        ContentType::Chart => "Focus on what the chart measures and its overall trend.".into(),
        ContentType::ScannedDocument => "Focus on the document's apparent subject, not OCR transcription.".into(),
        ContentType::Meme => "Focus on the joke or reference, not a literal pixel description.".into(),
        other => format!("Focus on the primary subject of this {} image.", other.as_str().to_lowercase()),
    }
}

/// Builds the full structured prompt: JSON-output header, purpose line,
/// focus line, compact signal block, format-specific rules.
pub fn build_prompt(content_type: ContentType, format: OutputFormat, signals: &MergedResult) -> String {
    let mut prompt = String::new();
    prompt.push_str("Respond with a JSON object containing a single \"caption\" field.\n");
    prompt.push_str(format.purpose_line());
    prompt.push('\n');
    prompt.push_str(&focus_line(content_type));
    prompt.push('\n');

    prompt.push_str("Known signals:\n");
    for key in high_weight_keys(content_type) {
        if let Some(signal) = signals.signals.get(*key) {
            prompt.push_str(&format!("- {key}: {:?} (confidence {:.2})\n", signal.value, signal.confidence.value()));
        }
    }

    if matches!(format, OutputFormat::AltText) {
        prompt.push_str(
            "Rules: subjects-first, no \"image of\" prefix, observable context only, under 125 characters.\n",
        );
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::{merge, DetectionContribution};
    use crate::signal::Signal;

    #[test]
    fn alt_text_prompt_includes_wcag_rules() {
        let contribution = DetectionContribution::new("ColorWave", "color")
            .with_salience(1.0)
            .with_signal(Signal::new(taxonomy::COLOR_DOMINANT_NAMES, vec!["blue".to_string()], 0.9, "ColorWave"));
        let merged = merge(&[contribution]);
        let prompt = build_prompt(ContentType::Photo, OutputFormat::AltText, &merged);
        assert!(prompt.contains("under 125 characters"));
        assert!(prompt.contains("color.dominant_color_names"));
    }
}
