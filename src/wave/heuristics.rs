//! Heuristic waves (spec.md §4.4): black-box signal producers with
//! documented outputs. An implementer may substitute any library for the
//! underlying pixel primitives (Sobel/Laplacian/entropy/histogram) - the
//! arithmetic here is the reference contract, not the mandated algorithm
//! (spec.md §1 non-goal).

use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::blackboard::Blackboard;
use crate::contribution::DetectionContribution;
use crate::signal::{taxonomy, Confidence, Signal};
use crate::wave::helpers::{make_contribution, ConfidenceBand};
use crate::wave::trigger::TriggerCondition;
use crate::wave::Wave;

/// Computes `identity.*` signals from the decoded pixel buffer. Confidence
/// is always 1.0 (spec.md §6): these are facts about the bytes, not
/// estimates.
pub struct IdentityWave;

#[async_trait]
impl Wave for IdentityWave {
    fn name(&self) -> &str {
        "IdentityWave"
    }
    fn priority(&self) -> i32 {
        100
    }
    fn is_optional(&self) -> bool {
        false
    }

    async fn contribute(
        &self,
        blackboard: &Blackboard,
        _cancel: CancellationToken,
    ) -> Vec<DetectionContribution> {
        let Some(image) = blackboard.image() else {
            return Vec::new();
        };

        let mut hasher = Sha256::new();
        hasher.update(&image.rgba);
        let digest = hex::encode(hasher.finalize());
        let aspect_ratio = image.width as f64 / image.height.max(1) as f64;

        let signals = vec![
            Signal::new(taxonomy::IDENTITY_SHA256, digest, Confidence::ONE, self.name()),
            Signal::new(
                taxonomy::IDENTITY_FORMAT,
                image.format.clone(),
                Confidence::ONE,
                self.name(),
            ),
            Signal::new(
                taxonomy::IDENTITY_WIDTH,
                image.width as i64,
                Confidence::ONE,
                self.name(),
            ),
            Signal::new(
                taxonomy::IDENTITY_HEIGHT,
                image.height as i64,
                Confidence::ONE,
                self.name(),
            ),
            Signal::new(
                taxonomy::IDENTITY_ASPECT_RATIO,
                aspect_ratio,
                Confidence::ONE,
                self.name(),
            ),
        ];

        vec![make_contribution(
            self.name(),
            "identity",
            ConfidenceBand::High,
            1.0,
            "decoded image identity facts",
            signals,
        )]
    }
}

/// Computes `color.*` signals: mean luminance/saturation, grayscale flag,
/// and a coarse dominant-color palette over quantized RGB buckets.
pub struct ColorWave;

#[async_trait]
impl Wave for ColorWave {
    fn name(&self) -> &str {
        "ColorWave"
    }
    fn priority(&self) -> i32 {
        90
    }

    fn trigger_conditions(&self) -> &[TriggerCondition] {
        &[]
    }

    async fn contribute(
        &self,
        blackboard: &Blackboard,
        _cancel: CancellationToken,
    ) -> Vec<DetectionContribution> {
        let Some(image) = blackboard.image() else {
            return Vec::new();
        };

        let pixels = image.rgba.chunks_exact(4);
        let pixel_count = pixels.clone().count().max(1);

        let mut luminance_sum = 0.0f64;
        let mut saturation_sum = 0.0f64;
        let mut buckets: std::collections::HashMap<(u8, u8, u8), u32> = std::collections::HashMap::new();

        for p in pixels {
            let (r, g, b) = (p[0] as f64, p[1] as f64, p[2] as f64);
            let luminance = 0.299 * r + 0.587 * g + 0.114 * b;
            luminance_sum += luminance;

            let max = r.max(g).max(b);
            let min = r.min(g).min(b);
            let saturation = if max == 0.0 { 0.0 } else { (max - min) / max };
            saturation_sum += saturation;

            let bucket = (p[0] & 0xE0, p[1] & 0xE0, p[2] & 0xE0);
            *buckets.entry(bucket).or_insert(0) += 1;
        }

        let mean_luminance = luminance_sum / pixel_count as f64 / 255.0;
        let mean_saturation = saturation_sum / pixel_count as f64;
        let is_grayscale = mean_saturation < 0.05;

        let mut ranked: Vec<((u8, u8, u8), u32)> = buckets.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let top = &ranked[..ranked.len().min(3)];

        let hexes: Vec<String> = top
            .iter()
            .map(|((r, g, b), _)| format!("#{r:02x}{g:02x}{b:02x}"))
            .collect();
        let percentages: Vec<String> = top
            .iter()
            .map(|(_, count)| format!("{:.3}", *count as f64 / pixel_count as f64))
            .collect();
        let names: Vec<String> = top.iter().map(|((r, g, b), _)| name_for(*r, *g, *b)).collect();

        let signals = vec![
            Signal::new(
                taxonomy::COLOR_MEAN_LUMINANCE,
                mean_luminance,
                Confidence::ONE,
                self.name(),
            ),
            Signal::new(
                taxonomy::COLOR_MEAN_SATURATION,
                mean_saturation,
                Confidence::ONE,
                self.name(),
            ),
            Signal::new(
                taxonomy::COLOR_IS_MOSTLY_GRAYSCALE,
                is_grayscale,
                Confidence::ONE,
                self.name(),
            ),
            Signal::new(taxonomy::COLOR_DOMINANT_HEXES, hexes.clone(), 0.9, self.name()),
            Signal::new(taxonomy::COLOR_DOMINANT_PERCENTAGES, percentages, 0.9, self.name()),
            Signal::new(taxonomy::COLOR_DOMINANT_NAMES, names.clone(), 0.9, self.name()),
            Signal::new(taxonomy::COLOR_PALETTE, names, 0.9, self.name()),
        ];

        vec![make_contribution(
            self.name(),
            "color",
            ConfidenceBand::Medium,
            0.7,
            "palette and luminance summary",
            signals,
        )]
    }
}

fn name_for(r: u8, g: u8, b: u8) -> String {
    match (r > 160, g > 160, b > 160, r < 60, g < 60, b < 60) {
        (_, _, _, true, true, true) => "black".to_string(),
        (true, true, true, ..) => "white".to_string(),
        (true, false, false, ..) => "red".to_string(),
        (false, true, false, ..) => "green".to_string(),
        (false, false, true, ..) => "blue".to_string(),
        (true, true, false, ..) => "yellow".to_string(),
        _ => "gray".to_string(),
    }
}

/// Computes `quality.edge_density` and `quality.luminance_entropy` from a
/// simple gradient pass over the luminance plane.
pub struct EdgeWave;

#[async_trait]
impl Wave for EdgeWave {
    fn name(&self) -> &str {
        "EdgeWave"
    }
    fn priority(&self) -> i32 {
        80
    }

    async fn contribute(
        &self,
        blackboard: &Blackboard,
        _cancel: CancellationToken,
    ) -> Vec<DetectionContribution> {
        let Some(image) = blackboard.image() else {
            return Vec::new();
        };
        let (width, height) = (image.width as usize, image.height as usize);
        if width < 2 || height < 2 {
            return vec![crate::wave::helpers::info_contribution(
                self.name(),
                "image too small for gradient analysis",
            )];
        }

        let luminance = luminance_plane(&image.rgba, width, height);

        let mut edge_pixels = 0u64;
        let mut gradient_threshold_hits = 0u64;
        for y in 0..height - 1 {
            for x in 0..width - 1 {
                let here = luminance[y * width + x];
                let right = luminance[y * width + x + 1];
                let down = luminance[(y + 1) * width + x];
                let gradient = (here - right).abs() + (here - down).abs();
                if gradient > 30.0 {
                    edge_pixels += 1;
                }
                gradient_threshold_hits += 1;
            }
        }
        let edge_density = edge_pixels as f64 / gradient_threshold_hits.max(1) as f64;

        let mut histogram = [0u64; 256];
        for v in &luminance {
            histogram[(*v as u8) as usize] += 1;
        }
        let total = luminance.len().max(1) as f64;
        let entropy = histogram
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / total;
                -p * p.log2()
            })
            .sum::<f64>();

        let signals = vec![
            Signal::new(
                taxonomy::QUALITY_EDGE_DENSITY,
                edge_density.clamp(0.0, 1.0),
                0.9,
                self.name(),
            ),
            Signal::new(
                taxonomy::QUALITY_LUMINANCE_ENTROPY,
                entropy.clamp(0.0, 8.0),
                0.9,
                self.name(),
            ),
        ];

        vec![make_contribution(
            self.name(),
            "quality",
            ConfidenceBand::Medium,
            0.6,
            "gradient edge density and luminance entropy",
            signals,
        )]
    }
}

/// Computes `quality.sharpness` via the variance of a discrete Laplacian
/// over the luminance plane - a standard blur-detection proxy.
pub struct BlurWave;

#[async_trait]
impl Wave for BlurWave {
    fn name(&self) -> &str {
        "BlurWave"
    }
    fn priority(&self) -> i32 {
        75
    }

    async fn contribute(
        &self,
        blackboard: &Blackboard,
        _cancel: CancellationToken,
    ) -> Vec<DetectionContribution> {
        let Some(image) = blackboard.image() else {
            return Vec::new();
        };
        let (width, height) = (image.width as usize, image.height as usize);
        if width < 3 || height < 3 {
            return vec![crate::wave::helpers::info_contribution(
                self.name(),
                "image too small for Laplacian variance",
            )];
        }
        let luminance = luminance_plane(&image.rgba, width, height);

        let mut laplacians = Vec::with_capacity((width - 2) * (height - 2));
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let center = luminance[y * width + x];
                let sum = luminance[y * width + x - 1]
                    + luminance[y * width + x + 1]
                    + luminance[(y - 1) * width + x]
                    + luminance[(y + 1) * width + x];
                laplacians.push(sum - 4.0 * center);
            }
        }
        let mean = laplacians.iter().sum::<f64>() / laplacians.len().max(1) as f64;
        let variance = laplacians.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / laplacians.len().max(1) as f64;

        let signal = Signal::new(taxonomy::QUALITY_SHARPNESS, variance, 0.8, self.name());
        let band = if variance < 300.0 {
            ConfidenceBand::Low
        } else {
            ConfidenceBand::High
        };

        vec![make_contribution(
            self.name(),
            "quality",
            band,
            0.7,
            "Laplacian-variance sharpness estimate",
            vec![signal],
        )]
    }
}

/// Estimates `content.text_likeliness` from edge density and luminance
/// entropy already on the blackboard (depends on `EdgeWave`).
pub struct TextLikelinessWave;

#[async_trait]
impl Wave for TextLikelinessWave {
    fn name(&self) -> &str {
        "TextLikelinessWave"
    }
    fn priority(&self) -> i32 {
        60
    }

    fn trigger_conditions(&self) -> &[TriggerCondition] {
        static TRIGGERS: std::sync::OnceLock<Vec<TriggerCondition>> = std::sync::OnceLock::new();
        TRIGGERS.get_or_init(|| {
            vec![TriggerCondition::SignalExists {
                signal: taxonomy::QUALITY_EDGE_DENSITY.to_string(),
            }]
        })
    }

    async fn contribute(
        &self,
        blackboard: &Blackboard,
        _cancel: CancellationToken,
    ) -> Vec<DetectionContribution> {
        let edge_density = blackboard
            .read_best(taxonomy::QUALITY_EDGE_DENSITY)
            .and_then(|s| s.value.as_double())
            .unwrap_or(0.0);
        let entropy = blackboard
            .read_best(taxonomy::QUALITY_LUMINANCE_ENTROPY)
            .and_then(|s| s.value.as_double())
            .unwrap_or(0.0);

        // Text-heavy images tend toward high edge density with moderate
        // (not maximal) entropy - lots of crisp small strokes on a flat
        // background, rather than a fully textured photo.
        let normalized_entropy_penalty = (entropy / 8.0 - 0.5).abs();
        let text_likeliness = (edge_density * 1.5 - normalized_entropy_penalty).clamp(0.0, 1.0);

        let signal = Signal::new(
            taxonomy::CONTENT_TEXT_LIKELINESS,
            text_likeliness,
            0.7,
            self.name(),
        );

        vec![make_contribution(
            self.name(),
            "content",
            ConfidenceBand::Medium,
            0.5,
            "edge-density derived text likeliness",
            vec![signal],
        )]
    }
}

/// Estimates `content.type`/`content.type_confidence` from the signals
/// produced by the earlier waves.
pub struct TypeWave;

#[async_trait]
impl Wave for TypeWave {
    fn name(&self) -> &str {
        "TypeWave"
    }
    fn priority(&self) -> i32 {
        50
    }

    fn trigger_conditions(&self) -> &[TriggerCondition] {
        static TRIGGERS: std::sync::OnceLock<Vec<TriggerCondition>> = std::sync::OnceLock::new();
        TRIGGERS.get_or_init(|| {
            vec![TriggerCondition::SignalExists {
                signal: taxonomy::CONTENT_TEXT_LIKELINESS.to_string(),
            }]
        })
    }

    async fn contribute(
        &self,
        blackboard: &Blackboard,
        _cancel: CancellationToken,
    ) -> Vec<DetectionContribution> {
        let text_likeliness = blackboard
            .read_best(taxonomy::CONTENT_TEXT_LIKELINESS)
            .and_then(|s| s.value.as_double())
            .unwrap_or(0.0);
        let is_grayscale = blackboard
            .read_best(taxonomy::COLOR_IS_MOSTLY_GRAYSCALE)
            .and_then(|s| s.value.as_bool())
            .unwrap_or(false);
        let edge_density = blackboard
            .read_best(taxonomy::QUALITY_EDGE_DENSITY)
            .and_then(|s| s.value.as_double())
            .unwrap_or(0.0);

        let (content_type, type_confidence) = if text_likeliness > 0.6 && is_grayscale {
            (taxonomy::ContentType::ScannedDocument, 0.75)
        } else if text_likeliness > 0.5 && edge_density > 0.2 {
            (taxonomy::ContentType::Diagram, 0.6)
        } else if text_likeliness > 0.3 {
            (taxonomy::ContentType::Screenshot, 0.65)
        } else {
            (taxonomy::ContentType::Photo, 0.8)
        };

        let signals = vec![
            Signal::new(
                taxonomy::CONTENT_TYPE,
                content_type.as_str(),
                type_confidence,
                self.name(),
            ),
            Signal::new(
                taxonomy::CONTENT_TYPE_CONFIDENCE,
                type_confidence,
                Confidence::ONE,
                self.name(),
            ),
        ];

        let early_exit = type_confidence >= 0.8;
        let mut contribution = make_contribution(
            self.name(),
            "content",
            ConfidenceBand::Medium,
            0.8,
            "heuristic content type classification",
            signals,
        );
        if early_exit {
            contribution = contribution.with_early_exit("high-confidence photo classification");
        }
        vec![contribution]
    }
}

fn luminance_plane(rgba: &[u8], width: usize, height: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(width * height);
    for chunk in rgba.chunks_exact(4).take(width * height) {
        out.push(0.299 * chunk[0] as f64 + 0.587 * chunk[1] as f64 + 0.114 * chunk[2] as f64);
    }
    out
}
