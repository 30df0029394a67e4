//! TTL cache for resolved tenant configurations.
//!
//! This is the only state shared across calls. It is built once at startup
//! and injected into the [`ClientDirectory`](super::ClientDirectory).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;

use super::tenant::TenantConfig;

/// Upper bound on cached identifiers.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub ttl_seconds: u64,
}

/// Tenant cache with per-entry time-to-live.
///
/// Entries expire `ttl` after insertion; an expired entry reads as a miss.
#[derive(Debug)]
pub struct TenantCache {
    entries: Cache<String, Arc<TenantConfig>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TenantCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self {
            entries,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<TenantConfig>> {
        let entry = self.entries.get(id).await;
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    pub async fn insert(&self, id: &str, config: Arc<TenantConfig>) {
        self.entries.insert(id.to_string(), config).await;
    }

    pub async fn invalidate(&self, id: &str) {
        self.entries.invalidate(id).await;
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Counters plus the live entry count. `fetches` is owned by the caller.
    pub async fn stats(&self, fetches: u64) -> CacheStats {
        self.entries.run_pending_tasks().await;
        CacheStats {
            total_entries: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}
