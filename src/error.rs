//! Crate-wide error kinds
//!
//! Each subsystem gets its own error enum at the module boundary; waves never
//! propagate these to the orchestrator (see `wave::Wave::contribute`), only
//! the orchestrator itself and the durable store surface them to callers.

use thiserror::Error;

/// Errors surfaced by the wave orchestrator to its caller.
///
/// Only these ever escape `WaveOrchestrator::analyze` - a wave throwing
/// internally is absorbed into a neutral contribution, never propagated here.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The image could not be decoded at all; the only fatal error at plan time.
    #[error("image unreadable: {0}")]
    ImageUnreadable(String),
    /// Every enabled wave failed or was skipped; no contributions to merge.
    #[error("all waves failed to contribute")]
    AllWavesFailed,
    /// `total_timeout` elapsed before the orchestrator could finalize.
    #[error("orchestrator timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// A wave manifest declared a cyclic dependency in `listens.required`.
    #[error("cycle detected in wave manifest graph at wave {wave}")]
    CycleDetected { wave: String },
}

/// Errors from manifest loading.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error reading manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("cycle detected in wave manifest graph at wave {wave}")]
    CycleDetected { wave: String },
}

/// Errors from the fast-path in-memory signature cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("signature key computation failed: {0}")]
    KeyComputation(String),
    #[error("io error hashing image: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the durable signature store.
///
/// `store()` never returns an error - writes are enqueued and retried by the
/// background flusher. Read failures degrade to "not found", logged at the
/// call site, never surfaced here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to the top-level caller of the whole pipeline (spec §6).
#[derive(Debug, Error)]
pub enum ImageIntelError {
    #[error("image unreadable: {0}")]
    ImageUnreadable(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("operation timed out")]
    Timeout,
    #[error("signature store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("vision llm unavailable: {0}")]
    LlmUnavailable(String),
    #[error("ocr unavailable: {0}")]
    OcrUnavailable(String),
}

impl From<OrchestratorError> for ImageIntelError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::ImageUnreadable(reason) => ImageIntelError::ImageUnreadable(reason),
            OrchestratorError::AllWavesFailed => {
                ImageIntelError::ImageUnreadable("all waves failed to contribute".to_string())
            }
            OrchestratorError::Timeout(_) => ImageIntelError::Timeout,
            OrchestratorError::CycleDetected { wave } => {
                ImageIntelError::ImageUnreadable(format!("manifest cycle at wave {wave}"))
            }
        }
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type CacheResult<T> = std::result::Result<T, CacheError>;
