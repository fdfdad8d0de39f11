//! Top-level driving pipeline (spec.md §2): wires the fast-path cache, the
//! wave orchestrator, motion/escalation, the discriminator, and the durable
//! store into the single dataflow a caller actually runs per image -
//! `ImageRequest -> FastPath(cache lookup) -> [HIT -> return] /
//! [MISS -> Orchestrator] -> Motion & Escalation -> Discriminator ->
//! Caching (write-through/write-behind)`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::blackboard::Blackboard;
use crate::cache::signature::{self, SignatureKey};
use crate::cache::{CachedSignature, SignatureCache};
use crate::decode::{DecodeError, ImageDecoder};
use crate::discriminator::{self, DiscriminatorInput, DiscriminatorScore};
use crate::error::ImageIntelError;
use crate::escalation::prompt::{build_prompt, OutputFormat};
use crate::escalation::{self, EscalationDecision, OcrClient, VisionLlmClient};
use crate::motion::{self, SceneResult};
use crate::orchestrator::{AnalysisOptions, WaveOrchestrator};
use crate::signal::taxonomy::ContentType;
use crate::store::sqlite::SqliteSignatureStore;
use crate::store::StoredSignature;
use crate::wave::WaveManifestSet;

/// How many scene/text-change boundaries `detect_scenes_with_text_awareness`
/// is allowed to keep for an animated input (spec.md §4.5 default).
const MAX_SCENES: usize = 20;
/// Perceptual near-duplicate budget for the fast-path lookup (spec.md §4.6).
const MAX_HAMMING_DISTANCE: u32 = 6;
/// Vision LLM caption length ceiling (spec.md §4.8).
const CAPTION_MAX_LEN: usize = 125;

/// A single image to analyze, plus what the caller wants out of it
/// (spec.md §2 `ImageRequest`).
pub struct ImageRequest<'a> {
    pub path: &'a Path,
    pub goal: &'a str,
    pub force_refresh: bool,
}

impl<'a> ImageRequest<'a> {
    pub fn new(path: &'a Path, goal: &'a str) -> Self {
        Self { path, goal, force_refresh: false }
    }

    /// Skips the fast-path cache lookup and always re-runs the orchestrator.
    pub fn with_force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

/// The result of running the full pipeline on one image (spec.md §2).
#[derive(Debug, Clone)]
pub struct ImageAnalysisOutcome {
    pub content_hash: String,
    pub from_cache: bool,
    pub confidence: f64,
    pub caption: Option<String>,
    pub ocr_text: Option<String>,
    pub scene_result: Option<SceneResult>,
    pub escalation: EscalationDecision,
    pub discriminator: Option<DiscriminatorScore>,
}

fn goal_to_format(goal: &str) -> OutputFormat {
    match goal {
        "alt_text" => OutputFormat::AltText,
        "social" => OutputFormat::Social,
        _ => OutputFormat::Caption,
    }
}

fn outcome_from_cache(content_hash: String, cached: CachedSignature) -> ImageAnalysisOutcome {
    ImageAnalysisOutcome {
        content_hash,
        from_cache: true,
        confidence: cached.confidence,
        caption: cached.caption,
        ocr_text: cached.ocr_text,
        scene_result: None,
        escalation: EscalationDecision::default(),
        discriminator: None,
    }
}

/// Wires every subsystem together behind one call. Construct once per
/// process (it owns the fast-path cache) and share behind an `Arc`.
pub struct ImagePipeline {
    decoder: Arc<dyn ImageDecoder>,
    orchestrator: WaveOrchestrator,
    options: AnalysisOptions,
    cache: SignatureCache,
    store: Option<Arc<SqliteSignatureStore>>,
    vision_llm: Option<Arc<dyn VisionLlmClient>>,
    ocr: Option<Arc<dyn OcrClient>>,
    config: crate::config::Config,
}

impl ImagePipeline {
    pub fn new(decoder: Arc<dyn ImageDecoder>, orchestrator: WaveOrchestrator, config: crate::config::Config) -> Self {
        let options = AnalysisOptions {
            max_parallelism: config.max_parallelism,
            total_timeout: config.total_timeout(),
            ..AnalysisOptions::default()
        };
        Self {
            cache: SignatureCache::new(config.cache_capacity, config.cache_ttl()),
            decoder,
            orchestrator,
            options,
            store: None,
            vision_llm: None,
            ocr: None,
            config,
        }
    }

    /// Derives per-lane concurrency caps from a loaded manifest set
    /// (spec.md §3 `LaneSpec.max_concurrency`).
    pub fn with_manifests(mut self, manifests: &WaveManifestSet) -> Self {
        self.options = self.options.with_lane_concurrency_from(manifests);
        self
    }

    pub fn with_store(mut self, store: Arc<SqliteSignatureStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_vision_llm(mut self, client: Arc<dyn VisionLlmClient>) -> Self {
        self.vision_llm = Some(client);
        self
    }

    pub fn with_ocr(mut self, client: Arc<dyn OcrClient>) -> Self {
        self.ocr = Some(client);
        self
    }

    pub fn cache(&self) -> &SignatureCache {
        &self.cache
    }

    /// Runs the full spec.md §2 dataflow for a single image.
    ///
    /// `prior_scores_for_image` is the caller-maintained discriminator
    /// history for this exact image (there is no ledger table for scores
    /// themselves - spec.md §4.9 only persists the learned effectiveness
    /// weights); pass the scores returned by earlier calls for the same
    /// `content_hash`, or an empty slice for a never-seen image.
    pub async fn analyze_image(
        &self,
        request: &ImageRequest<'_>,
        prior_scores_for_image: &[DiscriminatorScore],
    ) -> Result<ImageAnalysisOutcome, ImageIntelError> {
        let started_at = Instant::now();

        let image = self.decoder.decode(request.path).await.map_err(|err| match err {
            DecodeError::Unreadable(path, reason) => ImageIntelError::ImageUnreadable(format!("{path}: {reason}")),
            DecodeError::UnsupportedFormat(format) => ImageIntelError::UnsupportedFormat(format),
        })?;

        let key: SignatureKey = signature::compute_signature_key(request.path, &image)
            .map_err(|err| ImageIntelError::ImageUnreadable(err.to_string()))?;

        // Step 1: fast path - exact hit, then perceptual near-duplicate.
        if !request.force_refresh {
            if let Some(cached) = self
                .cache
                .get(&key.combined_key)
                .or_else(|| self.cache.find_similar(key.perceptual_hash, MAX_HAMMING_DISTANCE))
            {
                return Ok(outcome_from_cache(key.content_hash.clone(), cached));
            }
        }

        // Step 2: orchestrator run over a fresh blackboard.
        let blackboard = Blackboard::new(request.path, Some(image.clone()));
        let mut result = self.orchestrator.analyze(&blackboard, &self.options).await?;

        let content_type: ContentType = result
            .signals
            .signals
            .get(crate::signal::taxonomy::CONTENT_TYPE)
            .and_then(|s| s.value.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        // Step 3: motion/scene detection, animated inputs only.
        let (scene_result, text_change_frames) = if image.is_animated {
            let scenes = motion::detect_scenes_with_text_awareness(&image, MAX_SCENES, &[]);
            let text_change_frames = motion::detect_text_change_frames(&image, MAX_SCENES);
            (Some(scenes), text_change_frames)
        } else {
            (None, Vec::new())
        };

        // Step 4: escalation decision.
        let escalation_decision = escalation::decide(&result, scene_result.as_ref(), &text_change_frames);

        // Step 5: Vision LLM / OCR escalation, best-effort - a collaborator
        // being unreachable degrades the result, it never fails the run.
        if escalation_decision.escalate_to_vision_llm {
            if let Some(client) = &self.vision_llm {
                let prompt = build_prompt(content_type, goal_to_format(request.goal), &result.signals);
                let response = client.analyze(&image, &prompt).await;
                if response.success {
                    if let Some(caption) = response.caption {
                        result.caption = Some(escalation::postprocess_caption(&caption, CAPTION_MAX_LEN));
                    }
                }
            }
        }

        if escalation_decision.escalate_to_ocr {
            if let Some(client) = &self.ocr {
                let frame_indices = if escalation_decision.ocr_frame_indices.is_empty() {
                    vec![0]
                } else {
                    escalation_decision.ocr_frame_indices.clone()
                };
                let mut extracted = Vec::new();
                for frame_index in frame_indices {
                    if let Some(text) = client.extract_text(&image, frame_index).await {
                        extracted.push(text);
                    }
                }
                if !extracted.is_empty() {
                    result.ocr_text = Some(extracted.join("\n"));
                }
            }
        }

        // Step 6: discriminator scoring.
        let discriminator_input = DiscriminatorInput {
            image_hash: &key.content_hash,
            image_type: content_type.as_str(),
            signals: &result.signals,
            scene_result: scene_result.as_ref(),
            vision_caption: result.caption.as_deref(),
            ocr_text: result.ocr_text.as_deref(),
            goal: request.goal,
            prior_scores_for_image,
        };
        let discriminator_score = discriminator::score(&discriminator_input);

        // Step 7: caching - write-through to the in-memory fast path when the
        // result clears the confidence bar, write-behind to the durable store
        // regardless (spec.md §3 `CachedSignature` lifecycle, §4.7 store).
        if result.confidence >= self.config.cache_confidence_threshold {
            let processing_time_ms = started_at.elapsed().as_millis() as u64;
            let cached = CachedSignature::from_analysis(&key, &image, &result, processing_time_ms);
            self.cache.set(key.combined_key.clone(), cached);
        }

        if let Some(store) = &self.store {
            store.store(StoredSignature::from_analysis(&key, &result));
        }

        Ok(ImageAnalysisOutcome {
            content_hash: key.content_hash,
            from_cache: false,
            confidence: result.confidence,
            caption: result.caption,
            ocr_text: result.ocr_text,
            scene_result,
            escalation: escalation_decision,
            discriminator: Some(discriminator_score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedImage;
    use crate::wave::heuristics::{BlurWave, ColorWave, EdgeWave, IdentityWave, TextLikelinessWave, TypeWave};
    use crate::wave::Wave;
    use crate::ContradictionWave;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDecoder {
        image: DecodedImage,
    }

    #[async_trait]
    impl ImageDecoder for FixedDecoder {
        async fn decode(&self, _path: &Path) -> Result<DecodedImage, DecodeError> {
            Ok(self.image.clone())
        }
    }

    fn solid_image(width: u32, height: u32, rgb: (u8, u8, u8)) -> DecodedImage {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..(width * height) {
            rgba.extend_from_slice(&[rgb.0, rgb.1, rgb.2, 255]);
        }
        DecodedImage::still(width, height, rgba, "png")
    }

    fn default_waves() -> Vec<Arc<dyn Wave>> {
        vec![
            Arc::new(IdentityWave),
            Arc::new(ColorWave),
            Arc::new(EdgeWave),
            Arc::new(BlurWave),
            Arc::new(TextLikelinessWave),
            Arc::new(TypeWave),
            Arc::new(ContradictionWave),
        ]
    }

    fn pipeline(image: DecodedImage) -> ImagePipeline {
        let decoder = Arc::new(FixedDecoder { image });
        let orchestrator = WaveOrchestrator::new(default_waves());
        let mut config = crate::config::Config::default();
        config.max_parallelism = 8;
        ImagePipeline::new(decoder, orchestrator, config)
    }

    #[tokio::test]
    async fn miss_then_hit_short_circuits_the_second_call() {
        let image = solid_image(32, 32, (180, 90, 40));
        let pipeline = pipeline(image);
        let request = ImageRequest::new(Path::new("/tmp/photo.jpg"), "caption");

        let first = pipeline.analyze_image(&request, &[]).await.unwrap();
        assert!(!first.from_cache);
        assert!(first.discriminator.is_some());

        let second = pipeline.analyze_image(&request, &[]).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.content_hash, first.content_hash);
    }

    #[tokio::test]
    async fn low_confidence_result_is_not_cached() {
        let image = solid_image(4, 4, (1, 1, 1));
        let decoder = Arc::new(FixedDecoder { image });
        let orchestrator = WaveOrchestrator::new(vec![Arc::new(IdentityWave) as Arc<dyn Wave>]);
        let mut config = crate::config::Config::default();
        config.cache_confidence_threshold = 1.1; // unreachable, forces a miss every time
        let pipeline = ImagePipeline::new(decoder, orchestrator, config);
        let request = ImageRequest::new(Path::new("/tmp/flat.png"), "caption");

        pipeline.analyze_image(&request, &[]).await.unwrap();
        assert_eq!(pipeline.cache().stats().entries, 0);
    }

    struct CountingOcr {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrClient for CountingOcr {
        async fn extract_text(&self, _image: &DecodedImage, _frame_index: usize) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some("LOREM IPSUM".to_string())
        }
    }

    #[tokio::test]
    async fn heavy_text_escalation_calls_the_ocr_collaborator() {
        let mut image = solid_image(32, 32, (10, 10, 10));
        // Give the rightmost column sharp edges against a flat field so
        // TextLikelinessWave reports high text-likeliness.
        for y in 0..32usize {
            for x in 16..32usize {
                let offset = (y * 32 + x) * 4;
                image.rgba[offset..offset + 3].copy_from_slice(&[0, 0, 0]);
            }
        }
        let decoder = Arc::new(FixedDecoder { image });
        let orchestrator = WaveOrchestrator::new(default_waves());
        let config = crate::config::Config::default();
        let ocr = Arc::new(CountingOcr { calls: AtomicUsize::new(0) });
        let pipeline = ImagePipeline::new(decoder, orchestrator, config).with_ocr(ocr.clone());
        let request = ImageRequest::new(Path::new("/tmp/screenshot.png"), "caption");

        let outcome = pipeline.analyze_image(&request, &[]).await.unwrap();
        if outcome.escalation.escalate_to_ocr {
            assert!(ocr.calls.load(Ordering::SeqCst) >= 1);
            assert!(outcome.ocr_text.is_some());
        }
    }
}
