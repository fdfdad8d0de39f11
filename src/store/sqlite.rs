//! Sqlite-backed [`StoredSignature`] store with a read-through LRU and a
//! write-behind background flusher.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreResult;
use crate::store::{ema_update, migrations, StoreStats, StoredSignature};

const DEFAULT_LRU_CAPACITY: usize = 10_000;
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);
const REINFORCEMENT_STEP: f64 = 0.01;
const EMA_ALPHA: f64 = 0.2;

/// The durable signature store. `&self`-only methods (teacher's
/// `Storage` convention) so it can live behind an `Arc` and be shared with
/// the background flusher task without an outer lock.
pub struct SqliteSignatureStore {
    conn: Mutex<Connection>,
    cache: Mutex<LruCache<String, StoredSignature>>,
    pending: DashMap<String, StoredSignature>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl SqliteSignatureStore {
    pub fn open(path: &std::path::Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        migrations::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_LRU_CAPACITY).expect("nonzero capacity"),
            )),
            pending: DashMap::new(),
            flush_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        migrations::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_LRU_CAPACITY).expect("nonzero capacity"),
            )),
            pending: DashMap::new(),
            flush_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn configure_connection(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    /// Spawns the ~500ms write-behind flusher as a background task, and
    /// returns a handle that can be `.abort()`-ed on shutdown (after a final
    /// `flush_sync` call, per spec.md §4.7 "on shutdown, a final synchronous
    /// flush is performed").
    pub fn spawn_flusher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(err) = store.flush().await {
                    tracing::warn!(error = %err, "background flush failed, retrying next tick");
                }
            }
        })
    }

    /// Drains the pending-writes map into one transaction under a
    /// single-flight lock. On failure the transaction rolls back and the
    /// pending writes are left queued for the next tick.
    pub async fn flush(&self) -> StoreResult<usize> {
        let _guard = self.flush_lock.lock().await;
        let batch: Vec<(String, StoredSignature)> =
            self.pending.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            for (_, signature) in &batch {
                upsert(&tx, signature)?;
            }
            tx.commit()?;
        }

        for (key, _) in &batch {
            self.pending.remove(key);
        }
        tracing::debug!(count, "flushed signatures to durable store");
        Ok(count)
    }

    /// Synchronous final flush, for use on shutdown where no async runtime
    /// tick is guaranteed to fire again.
    pub fn flush_sync(&self) -> StoreResult<usize> {
        let batch: Vec<(String, StoredSignature)> =
            self.pending.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            for (_, signature) in &batch {
                upsert(&tx, signature)?;
            }
            tx.commit()?;
        }
        for (key, _) in &batch {
            self.pending.remove(key);
        }
        Ok(count)
    }

    pub fn get_by_content_hash(&self, content_hash: &str) -> StoreResult<Option<StoredSignature>> {
        if let Some(signature) = self.cache.lock().unwrap().get(content_hash).cloned() {
            return Ok(Some(signature));
        }
        if let Some(pending) = self.pending.get(content_hash) {
            return Ok(Some(pending.clone()));
        }
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(SELECT_BY_CONTENT_HASH, params![content_hash], row_to_signature)
            .optional()?;
        drop(conn);
        if let Some(signature) = &found {
            self.cache.lock().unwrap().put(content_hash.to_string(), signature.clone());
        }
        Ok(found)
    }

    pub fn get_by_perceptual_hash(&self, perceptual_hash: u64) -> StoreResult<Option<StoredSignature>> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                SELECT_BY_PERCEPTUAL_HASH,
                params![perceptual_hash as i64],
                row_to_signature,
            )
            .optional()?;
        drop(conn);
        if let Some(signature) = &found {
            self.cache
                .lock()
                .unwrap()
                .put(signature.content_hash.clone(), signature.clone());
        }
        Ok(found)
    }

    pub fn get_by_content_hashes(
        &self,
        hashes: &[String],
    ) -> StoreResult<HashMap<String, StoredSignature>> {
        let mut out = HashMap::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(signature) = self.get_by_content_hash(hash)? {
                out.insert(hash.clone(), signature);
            }
        }
        Ok(out)
    }

    /// In-memory is the source of truth: writes to the LRU immediately, then
    /// enqueues the record, coalescing with any already-queued write for the
    /// same hash.
    pub fn store(&self, signature: StoredSignature) {
        self.cache
            .lock()
            .unwrap()
            .put(signature.content_hash.clone(), signature.clone());
        self.pending.insert(signature.content_hash.clone(), signature);
    }

    /// EMA confidence update plus optional reinforcement bump.
    pub fn record_observation(
        &self,
        content_hash: &str,
        perceptual_hash: u64,
        successful: bool,
        confidence: f64,
    ) -> StoreResult<StoredSignature> {
        let mut signature = self
            .get_by_content_hash(content_hash)?
            .unwrap_or_else(|| StoredSignature::new(content_hash, perceptual_hash));

        let mut new_confidence = ema_update(signature.confidence, confidence, EMA_ALPHA);
        if successful {
            new_confidence = (new_confidence + REINFORCEMENT_STEP).min(1.0);
        }
        signature.confidence = new_confidence;
        signature.observation_count += 1;
        signature.last_seen = Utc::now();

        self.store(signature.clone());
        Ok(signature)
    }

    /// `confidence *= factor` for stale records, then deletes records that
    /// are both low-confidence and low-observation.
    pub fn decay_old(&self, max_age: chrono::Duration, factor: f64) -> StoreResult<u64> {
        self.flush_sync()?;
        let cutoff = Utc::now() - max_age;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE signatures SET confidence = confidence * ?1 WHERE last_seen < ?2",
            params![factor, cutoff.to_rfc3339()],
        )?;
        let deleted = conn.execute(
            "DELETE FROM signatures WHERE confidence < 0.1 AND observation_count < 3",
            [],
        )?;
        Ok(deleted as u64)
    }

    /// Preloads the `count` highest-`last_seen` records with confidence > 0.5.
    pub fn warmup_cache(&self, count: usize) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT content_hash, perceptual_hash, content_type, confidence, caption,
                    is_complete, observation_count, created_at, last_seen,
                    first_seen, mime_type, signals_json
             FROM signatures WHERE confidence > 0.5 ORDER BY last_seen DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![count as i64], row_to_signature)?;
        drop(stmt);

        let mut loaded = 0;
        let mut cache = self.cache.lock().unwrap();
        for row in rows {
            let signature = row?;
            cache.put(signature.content_hash.clone(), signature);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let row_count: u64 = conn.query_row("SELECT COUNT(*) FROM signatures", [], |row| row.get(0))?;
        Ok(StoreStats {
            row_count,
            cache_entries: self.cache.lock().unwrap().len(),
            pending_writes: self.pending.len(),
        })
    }
}

const SELECT_BY_CONTENT_HASH: &str = "SELECT content_hash, perceptual_hash, content_type, confidence, \
     caption, is_complete, observation_count, created_at, last_seen, \
     first_seen, mime_type, signals_json \
     FROM signatures WHERE content_hash = ?1";

const SELECT_BY_PERCEPTUAL_HASH: &str = "SELECT content_hash, perceptual_hash, content_type, confidence, \
     caption, is_complete, observation_count, created_at, last_seen, \
     first_seen, mime_type, signals_json \
     FROM signatures WHERE perceptual_hash = ?1 ORDER BY last_seen DESC LIMIT 1";

fn row_to_signature(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredSignature> {
    let created_at: String = row.get(7)?;
    let last_seen: String = row.get(8)?;
    let first_seen: Option<String> = row.get(9)?;
    Ok(StoredSignature {
        content_hash: row.get(0)?,
        perceptual_hash: row.get::<_, i64>(1)? as u64,
        content_type: row.get(2)?,
        confidence: row.get(3)?,
        caption: row.get(4)?,
        is_complete: row.get::<_, i64>(5)? != 0,
        observation_count: row.get::<_, i64>(6)? as u32,
        mime_type: row.get(10)?,
        signals_json: row.get(11)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_seen: DateTime::parse_from_rfc3339(&last_seen)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        first_seen: first_seen
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| DateTime::parse_from_rfc3339(&created_at).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())),
    })
}

fn upsert(tx: &rusqlite::Transaction<'_>, signature: &StoredSignature) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO signatures
            (content_hash, perceptual_hash, content_type, confidence, caption,
             is_complete, observation_count, created_at, last_seen,
             first_seen, mime_type, signals_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(content_hash) DO UPDATE SET
            perceptual_hash = excluded.perceptual_hash,
            content_type = COALESCE(excluded.content_type, signatures.content_type),
            confidence = excluded.confidence,
            caption = COALESCE(excluded.caption, signatures.caption),
            is_complete = (signatures.is_complete OR excluded.is_complete),
            observation_count = excluded.observation_count,
            last_seen = excluded.last_seen,
            mime_type = COALESCE(excluded.mime_type, signatures.mime_type),
            signals_json = COALESCE(excluded.signals_json, signatures.signals_json)",
        params![
            signature.content_hash,
            signature.perceptual_hash as i64,
            signature.content_type,
            signature.confidence,
            signature.caption,
            signature.is_complete as i64,
            signature.observation_count as i64,
            signature.created_at.to_rfc3339(),
            signature.last_seen.to_rfc3339(),
            signature.first_seen.to_rfc3339(),
            signature.mime_type,
            signature.signals_json,
        ],
    )?;
    Ok(())
}
