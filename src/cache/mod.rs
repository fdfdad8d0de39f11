//! Fast-Path Signature Cache (spec.md §4.6): two-tier in-memory lookup -
//! exact content-hash hit, or perceptual near-duplicate scan.

pub mod signature;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub use signature::{compute_signature_key, hamming_distance, SignatureKey};

/// A cached analysis result, keyed by the combined content+perceptual key
/// (spec.md §3 `CachedSignature`).
#[derive(Debug, Clone)]
pub struct CachedSignature {
    pub combined_key: String,
    pub content_hash: String,
    pub perceptual_hash: u64,
    pub content_type: Option<String>,
    pub confidence: f64,
    pub caption: Option<String>,
    pub ocr_text: Option<String>,
    pub width: u32,
    pub height: u32,
    pub is_animated: bool,
    pub signals: Vec<crate::signal::Signal>,
    pub contributing_waves: HashSet<String>,
    pub is_complete: bool,
    pub original_processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub hit_count: u64,
    pub support_count: u32,
}

impl CachedSignature {
    pub fn new(content_hash: impl Into<String>, perceptual_hash: u64) -> Self {
        let content_hash = content_hash.into();
        let now = Utc::now();
        Self {
            combined_key: format!("{content_hash}:{perceptual_hash:016x}"),
            content_hash,
            perceptual_hash,
            content_type: None,
            confidence: 0.0,
            caption: None,
            ocr_text: None,
            width: 0,
            height: 0,
            is_animated: false,
            signals: Vec::new(),
            contributing_waves: HashSet::new(),
            is_complete: false,
            original_processing_time_ms: 0,
            created_at: now,
            last_accessed_at: now,
            hit_count: 0,
            support_count: 1,
        }
    }

    /// Builds a cache entry from a completed analysis, gated by the caller
    /// on `confidence >= cache_confidence_threshold` (spec.md §3 lifecycle).
    pub fn from_analysis(
        key: &signature::SignatureKey,
        image: &crate::decode::DecodedImage,
        result: &crate::orchestrator::ImageAnalysisResult,
        processing_time_ms: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            combined_key: key.combined_key.clone(),
            content_hash: key.content_hash.clone(),
            perceptual_hash: key.perceptual_hash,
            content_type: result
                .signals
                .signals
                .get(crate::signal::taxonomy::CONTENT_TYPE)
                .and_then(|s| s.value.as_str())
                .map(str::to_string),
            confidence: result.confidence,
            caption: result.caption.clone(),
            ocr_text: result.ocr_text.clone(),
            width: image.width,
            height: image.height,
            is_animated: image.is_animated,
            signals: result.signals.signals.values().cloned().collect(),
            contributing_waves: result.completed_waves.clone(),
            is_complete: !result.early_exit || result.confidence >= 0.5,
            original_processing_time_ms: processing_time_ms,
            created_at: now,
            last_accessed_at: now,
            hit_count: 0,
            support_count: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub perceptual_hits: u64,
    pub hit_rate: f64,
}

struct Entry {
    signature: CachedSignature,
    last_accessed_at: RwLock<Instant>,
}

/// In-memory fast-path cache. `get` only ever takes a single `DashMap`
/// shard's lock (to bump hit count and access time in place); `set` and
/// eviction are serialized under `write_lock` to keep the content map and
/// perceptual index consistent.
pub struct SignatureCache {
    entries: DashMap<String, Entry>,
    perceptual_index: DashMap<u64, String>,
    write_lock: std::sync::Mutex<()>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    perceptual_hits: AtomicU64,
}

impl SignatureCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            perceptual_index: DashMap::new(),
            write_lock: std::sync::Mutex::new(()),
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            perceptual_hits: AtomicU64::new(0),
        }
    }

    /// Exact hit on `combined_key`. A stale entry (older than `ttl` since
    /// last access) counts as a miss and is evicted.
    pub fn get(&self, combined_key: &str) -> Option<CachedSignature> {
        if let Some(mut entry) = self.entries.get_mut(combined_key) {
            let age = entry.last_accessed_at.read().unwrap().elapsed();
            if age > self.ttl {
                drop(entry);
                self.remove(combined_key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            *entry.last_accessed_at.write().unwrap() = Instant::now();
            entry.signature.last_accessed_at = Utc::now();
            entry.signature.hit_count += 1;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.signature.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Exact perceptual-index match first, else a linear scan for the first
    /// entry within `max_hamming` (spec.md §4.6).
    pub fn find_similar(&self, perceptual_hash: u64, max_hamming: u32) -> Option<CachedSignature> {
        if let Some(content_key) = self.perceptual_index.get(&perceptual_hash) {
            if let Some(signature) = self.get(content_key.value()) {
                self.perceptual_hits.fetch_add(1, Ordering::Relaxed);
                return Some(signature);
            }
        }

        for entry in self.perceptual_index.iter() {
            if hamming_distance(*entry.key(), perceptual_hash) <= max_hamming {
                if let Some(signature) = self.get(entry.value()) {
                    self.perceptual_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(signature);
                }
            }
        }
        None
    }

    /// Insert, evicting the oldest 10% by `last_accessed_at` if at capacity.
    pub fn set(&self, combined_key: String, signature: CachedSignature) {
        let _guard = self.write_lock.lock().unwrap();

        if self.entries.len() >= self.capacity {
            self.evict_oldest_tenth();
        }

        self.perceptual_index
            .insert(signature.perceptual_hash, combined_key.clone());
        self.entries.insert(
            combined_key,
            Entry {
                signature,
                last_accessed_at: RwLock::new(Instant::now()),
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.entries.len(),
            hits,
            misses,
            perceptual_hits: self.perceptual_hits.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    fn remove(&self, combined_key: &str) {
        if let Some((_, entry)) = self.entries.remove(combined_key) {
            self.perceptual_index.remove(&entry.signature.perceptual_hash);
        }
    }

    fn evict_oldest_tenth(&self) {
        let mut ages: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value().last_accessed_at.read().unwrap()))
            .collect();
        ages.sort_by_key(|(_, last_accessed_at)| *last_accessed_at);

        let evict_count = (ages.len() / 10).max(1);
        for (key, _) in ages.into_iter().take(evict_count) {
            self.remove(&key);
        }
    }
}

/// Summary over `get`/`find_similar` outcomes a caller can report to
/// `tracing` without holding a reference into the cache.
pub fn describe_lookup(hit: bool, perceptual: bool) -> &'static str {
    match (hit, perceptual) {
        (true, true) => "perceptual_hit",
        (true, false) => "exact_hit",
        (false, _) => "miss",
    }
}

pub type KeyLookup = HashMap<String, CachedSignature>;
