//! Durable Signature Store (spec.md §4.7): sqlite-backed key/value store over
//! `content_hash -> StoredSignature`, read-through LRU, write-behind flusher.
//!
//! Grounded on the teacher's `storage::sqlite::Storage`: a synchronous API
//! wrapping `Mutex<rusqlite::Connection>`, versioned migrations applied at
//! open time, and an `lru::LruCache` in front of the database.

pub mod migrations;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::signal::Signal;

/// A persisted analysis result (spec.md §3 StoredSignature) - a superset of
/// `CachedSignature` plus `first_seen`, `observation_count`, MIME type, and
/// a `signals_json` blob (spec.md:55, spec.md:208).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSignature {
    pub content_hash: String,
    pub perceptual_hash: u64,
    pub content_type: Option<String>,
    pub confidence: f64,
    pub caption: Option<String>,
    pub is_complete: bool,
    pub observation_count: u32,
    pub mime_type: Option<String>,
    /// Full per-image signal map, serialized to JSON for the durable store's
    /// full-text-ready `signals_json` column.
    pub signals_json: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl StoredSignature {
    pub fn new(content_hash: impl Into<String>, perceptual_hash: u64) -> Self {
        let now = Utc::now();
        Self {
            content_hash: content_hash.into(),
            perceptual_hash,
            content_type: None,
            confidence: 0.5,
            caption: None,
            is_complete: false,
            observation_count: 0,
            mime_type: None,
            signals_json: None,
            first_seen: now,
            created_at: now,
            last_seen: now,
        }
    }

    /// Serializes `signals` into the `signals_json` column. Falls back to
    /// `None` (rather than failing the write) if a signal value somehow
    /// isn't representable as JSON - this column is a read-side convenience,
    /// not load-bearing for the store's primary fields.
    pub fn with_signals(mut self, signals: &[Signal]) -> Self {
        self.signals_json = serde_json::to_string(signals).ok();
        self
    }

    /// Builds a durable record from a completed analysis, mirroring
    /// `CachedSignature::from_analysis` (spec.md §3 lifecycle, §2 write-behind
    /// caching step).
    pub fn from_analysis(
        key: &crate::cache::signature::SignatureKey,
        result: &crate::orchestrator::ImageAnalysisResult,
    ) -> Self {
        let now = Utc::now();
        let content_type = result
            .signals
            .signals
            .get(crate::signal::taxonomy::CONTENT_TYPE)
            .and_then(|s| s.value.as_str())
            .map(str::to_string);
        let signals: Vec<Signal> = result.signals.signals.values().cloned().collect();
        Self {
            content_hash: key.content_hash.clone(),
            perceptual_hash: key.perceptual_hash,
            content_type,
            confidence: result.confidence,
            caption: result.caption.clone(),
            is_complete: !result.early_exit || result.confidence >= 0.5,
            observation_count: 1,
            mime_type: None,
            signals_json: serde_json::to_string(&signals).ok(),
            first_seen: now,
            created_at: now,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub row_count: u64,
    pub cache_entries: usize,
    pub pending_writes: usize,
}

/// Exponential moving average update used by `record_observation`
/// (spec.md §4.7): `new = old * (1 - alpha) + confidence * alpha`.
pub fn ema_update(old: f64, confidence: f64, alpha: f64) -> f64 {
    (old * (1.0 - alpha) + confidence * alpha).clamp(0.0, 1.0)
}
