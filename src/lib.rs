//! # imagewave-core
//!
//! Offline image intelligence pipeline core.
//!
//! A priority-ordered wave orchestrator merges confidence-scored signals from
//! independent heuristic analyzers onto a shared per-image blackboard, backed
//! by a two-tier fast-path signature cache and a durable write-behind store.
//! Animated inputs additionally run through scene/motion/text-change
//! detection; a post-analysis escalation step decides whether to call an
//! external Vision LLM and/or OCR engine, and a discriminator scores the
//! result and learns which signals to trust over time.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use imagewave_core::prelude::*;
//!
//! let waves: Vec<std::sync::Arc<dyn Wave>> = vec![
//!     std::sync::Arc::new(wave::heuristics::IdentityWave),
//!     std::sync::Arc::new(wave::heuristics::ColorWave),
//! ];
//! let orchestrator = WaveOrchestrator::new(waves);
//! let blackboard = Blackboard::new("photo.jpg", Some(decoded_image));
//! let result = orchestrator.analyze(&blackboard, &AnalysisOptions::default()).await?;
//! ```
//!
//! ## Feature flags
//!
//! - `bundled-sqlite` (default): vendor and statically link SQLite for the
//!   durable signature store, via `rusqlite`'s `bundled` feature.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod blackboard;
pub mod cache;
pub mod config;
pub mod contradiction;
pub mod contribution;
pub mod decode;
pub mod discriminator;
pub mod error;
pub mod escalation;
pub mod motion;
pub mod orchestrator;
pub mod pipeline;
pub mod signal;
pub mod store;
pub mod wave;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use blackboard::{Blackboard, BlackboardSnapshot};
pub use cache::{CachedSignature, CacheStats, SignatureCache};
pub use config::Config;
pub use contradiction::{detect as detect_contradictions, resolve as resolve_contradiction, ContradictionRule, ContradictionWave, ResolutionStrategy};
pub use contribution::{merge, DetectionContribution, MergedResult};
pub use decode::{DecodeError, DecodedImage, ImageDecoder};
pub use discriminator::{
    did_signal_agree, record_feedback, score as score_discriminator, DiscriminatorEffectiveness,
    DiscriminatorInput, DiscriminatorScore, FeedbackRecord, SignalContribution,
};
pub use error::{CacheError, ImageIntelError, ManifestError, OrchestratorError, StoreError};
pub use escalation::{decide as decide_escalation, postprocess_caption, EscalationDecision, OcrClient, VisionLlmClient};
pub use motion::{
    detect_scenes, detect_scenes_with_text_awareness, detect_text_change_frames, detect_unique_text_frames,
    SceneResult, TextBox,
};
pub use orchestrator::{AnalysisOptions, ImageAnalysisResult, WaveOrchestrator};
pub use pipeline::{ImageAnalysisOutcome, ImagePipeline, ImageRequest};
pub use signal::{Confidence, Signal, SignalValue};
pub use store::{sqlite::SqliteSignatureStore, StoreStats, StoredSignature};
pub use wave::{Lane, TriggerCondition, Wave, WaveManifest, WaveManifestSet};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        AnalysisOptions, Blackboard, Config, DecodedImage, DetectionContribution, ImageAnalysisResult,
        ImageIntelError, MergedResult, Signal, SignalValue, Wave, WaveManifest, WaveManifestSet, WaveOrchestrator,
    };
    pub use crate::{CachedSignature, SignatureCache};
    pub use crate::{DiscriminatorScore, EscalationDecision};
    pub use crate::{ImageAnalysisOutcome, ImagePipeline, ImageRequest};
    pub use crate::{SceneResult, StoredSignature};
}
