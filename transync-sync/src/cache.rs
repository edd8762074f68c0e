//! Persistent translation cache backed by SQLite.
//!
//! Entries are keyed by `(file_path, revision, line_no, src_hash)` where
//! `src_hash` is the SHA-256 of the exact source line. A lookup for the same
//! position with different content is a miss, so stale translations are never
//! returned. Lookup and store failures are logged and degrade to a miss or a
//! no-op; only opening the database can fail.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use transync_core::{DocPath, RevisionId};

use crate::error::{io_err, SyncError};

const SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lowercase SHA-256 hex of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Runtime counters for one process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// What is on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub total_entries: usize,
    pub distinct_files: usize,
    /// Files with the most entries, descending.
    pub top_files: Vec<(String, usize)>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    errors: AtomicU64,
}

pub struct TranslationCache {
    conn: Mutex<Connection>,
    counters: Counters,
}

impl std::fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl TranslationCache {
    /// Open (creating if needed) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open `path`, or fall back to an in-memory cache when the file cannot be
    /// used (unreadable, not a database, wrong schema).
    pub fn open_or_degrade(path: &Path) -> Result<Self, SyncError> {
        match Self::open(path) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                tracing::warn!(
                    "translation cache {} unusable ({e}); continuing with an in-memory cache",
                    path.display()
                );
                Self::open_in_memory()
            }
        }
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            counters: Counters::default(),
        }
    }

    /// Look up the translation of `source` at `(path, revision, line)`.
    pub fn get(
        &self,
        path: &DocPath,
        revision: &RevisionId,
        line: usize,
        source: &str,
    ) -> Option<String> {
        let hash = content_hash(source);
        let now = timestamp(Utc::now());
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT id, translated_text FROM translation_cache
                 WHERE file_path = ?1 AND revision = ?2 AND line_no = ?3 AND src_hash = ?4",
                params![path.as_str(), revision.as_str(), line as i64, hash],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional();

        match found {
            Ok(Some((id, text))) => {
                if let Err(e) = conn.execute(
                    "UPDATE translation_cache
                     SET accessed_at = ?1, access_count = access_count + 1
                     WHERE id = ?2",
                    params![now, id],
                ) {
                    tracing::warn!("cache bookkeeping failed for {path}:{line}: {e}");
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache hit {path}:{line}");
                Some(text)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache miss {path}:{line}");
                None
            }
            Err(e) => {
                tracing::warn!("cache lookup failed for {path}:{line}: {e}");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a translation; an existing entry for the same key is replaced.
    pub fn put(
        &self,
        path: &DocPath,
        revision: &RevisionId,
        line: usize,
        source: &str,
        translated: &str,
        model: &str,
    ) {
        let hash = content_hash(source);
        let now = timestamp(Utc::now());
        let result = self.conn.lock().execute(
            "INSERT INTO translation_cache
               (file_path, revision, line_no, src_hash, original_text, translated_text,
                model, created_at, accessed_at, access_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 0)
             ON CONFLICT (file_path, revision, line_no, src_hash) DO UPDATE SET
               translated_text = excluded.translated_text,
               model = excluded.model,
               created_at = excluded.created_at,
               accessed_at = excluded.accessed_at",
            params![
                path.as_str(),
                revision.as_str(),
                line as i64,
                hash,
                source,
                translated,
                model,
                now
            ],
        );
        match result {
            Ok(_) => {
                self.counters.stores.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!("cache store failed for {path}:{line}: {e}");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove entries not accessed within the last `days` days.
    pub fn prune_older_than(&self, days: u32) -> Result<usize, SyncError> {
        self.prune_before(Utc::now() - chrono::Duration::days(i64::from(days)))
    }

    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, SyncError> {
        let removed = self.conn.lock().execute(
            "DELETE FROM translation_cache WHERE accessed_at < ?1",
            params![timestamp(cutoff)],
        )?;
        tracing::info!("pruned {removed} cache entries");
        Ok(removed)
    }

    pub fn clear(&self) -> Result<usize, SyncError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM translation_cache", [])?;
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            stores: self.counters.stores.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    pub fn database_stats(&self, top: usize) -> Result<DatabaseStats, SyncError> {
        let conn = self.conn.lock();
        let (total, files): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT file_path) FROM translation_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT file_path, COUNT(*) AS n FROM translation_cache
             GROUP BY file_path ORDER BY n DESC, file_path ASC LIMIT ?1",
        )?;
        let top_files = stmt
            .query_map(params![top as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DatabaseStats {
            total_entries: total as usize,
            distinct_files: files as usize,
            top_files,
        })
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS translation_cache (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           file_path TEXT NOT NULL,
           revision TEXT NOT NULL,
           line_no INTEGER NOT NULL,
           src_hash TEXT NOT NULL,
           original_text TEXT NOT NULL,
           translated_text TEXT NOT NULL,
           model TEXT NOT NULL,
           created_at TEXT NOT NULL,
           accessed_at TEXT NOT NULL,
           access_count INTEGER NOT NULL DEFAULT 0,
           UNIQUE (file_path, revision, line_no, src_hash)
         );
         CREATE INDEX IF NOT EXISTS translation_cache_by_accessed
           ON translation_cache (accessed_at);
         CREATE TABLE IF NOT EXISTS meta (
           key TEXT PRIMARY KEY,
           value TEXT NOT NULL
         );",
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> (DocPath, RevisionId) {
        (DocPath::from("docs/setup.md"), RevisionId::from("abc123"))
    }

    #[test]
    fn hit_after_put() {
        let cache = TranslationCache::open_in_memory().unwrap();
        let (path, rev) = key();
        cache.put(&path, &rev, 2, "You need Java 21.", "Java 21 が必要です。", "mock");
        assert_eq!(
            cache.get(&path, &rev, 2, "You need Java 21.").as_deref(),
            Some("Java 21 が必要です。")
        );
    }

    #[test]
    fn different_content_at_same_position_misses() {
        let cache = TranslationCache::open_in_memory().unwrap();
        let (path, rev) = key();
        cache.put(&path, &rev, 2, "source A", "X", "mock");
        assert_eq!(cache.get(&path, &rev, 2, "source B"), None);
        assert_eq!(cache.get(&path, &rev, 3, "source A"), None);
        assert_eq!(cache.get(&path, &RevisionId::from("other"), 2, "source A"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.stores, 1);
    }

    #[test]
    fn put_overwrites_same_key() {
        let cache = TranslationCache::open_in_memory().unwrap();
        let (path, rev) = key();
        cache.put(&path, &rev, 0, "line", "old", "mock");
        cache.put(&path, &rev, 0, "line", "new", "mock");
        assert_eq!(cache.get(&path, &rev, 0, "line").as_deref(), Some("new"));
        assert_eq!(cache.database_stats(5).unwrap().total_entries, 1);
    }

    #[test]
    fn entries_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("state").join("cache.sqlite3");
        let (path, rev) = key();
        {
            let cache = TranslationCache::open(&db).unwrap();
            cache.put(&path, &rev, 1, "Hello", "こんにちは", "mock");
        }
        let cache = TranslationCache::open(&db).unwrap();
        assert_eq!(cache.get(&path, &rev, 1, "Hello").as_deref(), Some("こんにちは"));
    }

    #[test]
    fn corrupt_file_degrades_to_memory() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cache.sqlite3");
        std::fs::write(&db, b"this is definitely not an sqlite database file....").unwrap();
        assert!(TranslationCache::open(&db).is_err());

        let cache = TranslationCache::open_or_degrade(&db).unwrap();
        let (path, rev) = key();
        cache.put(&path, &rev, 0, "a", "b", "mock");
        assert_eq!(cache.get(&path, &rev, 0, "a").as_deref(), Some("b"));
    }

    #[test]
    fn prune_and_clear() {
        let cache = TranslationCache::open_in_memory().unwrap();
        let (path, rev) = key();
        cache.put(&path, &rev, 0, "a", "A", "mock");
        cache.put(&path, &rev, 1, "b", "B", "mock");

        assert_eq!(cache.prune_older_than(30).unwrap(), 0);
        let future = Utc::now() + chrono::Duration::days(1);
        assert_eq!(cache.prune_before(future).unwrap(), 2);

        cache.put(&path, &rev, 0, "a", "A", "mock");
        assert_eq!(cache.clear().unwrap(), 1);
    }

    #[test]
    fn database_stats_rank_files() {
        let cache = TranslationCache::open_in_memory().unwrap();
        let rev = RevisionId::from("r1");
        let big = DocPath::from("docs/big.md");
        let small = DocPath::from("docs/small.md");
        for i in 0..3 {
            cache.put(&big, &rev, i, &format!("line {i}"), "t", "mock");
        }
        cache.put(&small, &rev, 0, "only", "t", "mock");

        let stats = cache.database_stats(10).unwrap();
        assert_eq!(stats.total_entries, 4);
        assert_eq!(stats.distinct_files, 2);
        assert_eq!(stats.top_files[0], ("docs/big.md".to_string(), 3));
    }

    #[test]
    fn hit_rate_counts_lookups() {
        let cache = TranslationCache::open_in_memory().unwrap();
        let (path, rev) = key();
        cache.put(&path, &rev, 0, "a", "A", "mock");
        cache.get(&path, &rev, 0, "a");
        cache.get(&path, &rev, 0, "b");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
