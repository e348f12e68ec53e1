// src/selection/cache.rs
use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::services::SearchResult;

struct CacheEntry {
    result: SearchResult,
    created: DateTime<Utc>,
}

/// Memoizes availability queries by (geometry, date range, cloud threshold)
/// so repeated runs over the same plots do not hit the catalogue again.
///
/// Entries expire after the TTL (default 24h) and are purged lazily on
/// lookup; a partially stale entry is never served. Shared across workers.
pub struct SearchCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SearchCache {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            ttl: Duration::hours(ttl_hours),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic key over the normalized query. Coordinates are fixed
    /// to 6 decimal places (about 10 cm) so equal logical geometries hash
    /// identically regardless of float noise.
    pub fn key(ring: &[(f64, f64)], start: NaiveDate, end: NaiveDate, max_cloud_pct: f64) -> String {
        let mut hasher = Sha256::new();
        for &(lon, lat) in ring {
            hasher.update(format!("{lon:.6},{lat:.6};"));
        }
        hasher.update(format!("{start}_{end}_{max_cloud_pct:.2}"));
        format!("{:x}", hasher.finalize())
    }

    pub fn lookup(
        &self,
        ring: &[(f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
    ) -> Option<SearchResult> {
        self.lookup_at(ring, start, end, max_cloud_pct, Utc::now())
    }

    /// Lookup with an injected clock, used by TTL tests.
    pub fn lookup_at(
        &self,
        ring: &[(f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
        now: DateTime<Utc>,
    ) -> Option<SearchResult> {
        let key = Self::key(ring, start, end, max_cloud_pct);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if now - entry.created < self.ttl => {
                tracing::debug!("search cache hit for {}", &key[..8]);
                Some(entry.result.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn store(
        &self,
        ring: &[(f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
        result: SearchResult,
    ) {
        self.store_at(ring, start, end, max_cloud_pct, result, Utc::now());
    }

    pub fn store_at(
        &self,
        ring: &[(f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
        result: SearchResult,
        now: DateTime<Utc>,
    ) {
        let key = Self::key(ring, start, end, max_cloud_pct);
        tracing::debug!("caching search results for {}", &key[..8]);
        self.entries.lock().insert(
            key,
            CacheEntry {
                result,
                created: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
