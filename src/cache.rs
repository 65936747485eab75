//! File-based cache for component reports.
//!
//! Each coordinate is stored as one JSON file holding the report and the
//! time it was inserted. Entries older than the cache's TTL are treated as
//! absent. Unreadable or undecodable entries are treated the same way, so a
//! damaged cache heals itself by refetching.
//!
//! # Cache Location
//!
//! See [`crate::platform::report_cache_dir`]. A single process is expected
//! to own the directory; nothing coordinates concurrent writers.
//!
//! # Example
//!
//! ```no_run
//! use depaudit::Cache;
//! use depaudit::model::{Coordinate, CoordinateReport};
//!
//! let cache = Cache::with_ttl_hours(12);
//! let coordinate = Coordinate::new("golang", "example.com/lib", "1.0.0");
//!
//! cache.put(&[CoordinateReport::clean(coordinate.as_str())]).unwrap();
//!
//! let lookup = cache.get(&[coordinate]);
//! assert_eq!(lookup.hits.len(), 1);
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::model::{Coordinate, CoordinateReport};
use crate::platform::report_cache_dir;

/// Default cache TTL in hours.
pub const CACHE_TTL_HOURS: u64 = 12;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    record: CoordinateReport,
    inserted_at: DateTime<Utc>,
}

/// Result of partitioning keys against the cache.
#[derive(Debug, Default)]
pub struct CacheLookup {
    pub missing: Vec<Coordinate>,
    pub hits: Vec<CoordinateReport>,
}

pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
}

impl Cache {
    /// Creates a cache in the default location with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl_hours(CACHE_TTL_HOURS)
    }

    pub fn with_ttl_hours(hours: u64) -> Self {
        Self::at(report_cache_dir(), Duration::from_secs(hours.saturating_mul(3600)))
    }

    /// Creates a cache rooted at `dir`.
    pub fn at(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Partitions `keys` into cached reports and keys that need fetching.
    pub fn get(&self, keys: &[Coordinate]) -> CacheLookup {
        self.lookup_at(keys, Utc::now())
    }

    /// Same as [`Cache::get`] with an explicit notion of "now".
    pub fn lookup_at(&self, keys: &[Coordinate], now: DateTime<Utc>) -> CacheLookup {
        let mut lookup = CacheLookup::default();

        for key in keys {
            match self.read_fresh(key, now) {
                Some(record) => lookup.hits.push(record),
                None => lookup.missing.push(key.clone()),
            }
        }

        debug!(
            hits = lookup.hits.len(),
            missing = lookup.missing.len(),
            "cache lookup"
        );
        lookup
    }

    fn read_fresh(&self, key: &Coordinate, now: DateTime<Utc>) -> Option<CoordinateReport> {
        let cache_key = key.cache_key();
        let path = self.entry_path(&cache_key);

        let content = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Ignoring corrupt cache entry for {}: {}", key, e);
                return None;
            }
        };

        if entry.record.cache_key() != cache_key {
            debug!("Cache entry at {} belongs to another key", path.display());
            return None;
        }

        // A negative age (clock moved back) counts as fresh
        let expired = now
            .signed_duration_since(entry.inserted_at)
            .to_std()
            .is_ok_and(|age| age > self.ttl);
        if expired {
            return None;
        }

        Some(entry.record)
    }

    /// Stores each record, replacing any previous entry for its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or an
    /// entry cannot be written.
    pub fn put(&self, records: &[CoordinateReport]) -> Result<()> {
        self.put_at(records, Utc::now())
    }

    pub(crate) fn put_at(&self, records: &[CoordinateReport], now: DateTime<Utc>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        for record in records {
            let path = self.entry_path(&record.cache_key());
            let entry = CacheEntry {
                record: record.clone(),
                inserted_at: now,
            };
            let content = serde_json::to_string(&entry)?;

            // Write then rename so a reader never sees a half-written entry
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, content)?;
            fs::rename(&tmp, &path)?;
        }

        Ok(())
    }

    /// Deletes the cache directory and everything in it.
    ///
    /// Succeeds when the directory does not exist.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_path(&self, cache_key: &str) -> PathBuf {
        let digest = Sha256::digest(cache_key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
