//! Tenant directory.
//!
//! Resolves a telephony identifier (the SIP number a call was placed to) to
//! the agent configuration of the tenant that owns it. Lookups go through an
//! injected [`TenantCache`]; misses are fetched from a [`TenantSource`]:
//!
//! - [`FileTenantSource`]: YAML map on disk, with per-environment overrides
//! - [`RestTenantSource`]: PostgREST-style HTTP backend
//!
//! Only positive results are cached, so a number provisioned after a miss is
//! picked up on the next call.

pub mod cache;
pub mod file;
pub mod rest;
pub mod tenant;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use cache::{CacheStats, TenantCache};
pub use file::FileTenantSource;
pub use rest::RestTenantSource;
pub use tenant::{AudioSettings, TenantConfig, TurnDetectionSettings};

/// Errors from a tenant source.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Tenant source error: {0}")]
    Source(String),

    #[error("Failed to parse tenant data: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Backing store for tenant configurations.
#[async_trait]
pub trait TenantSource: Send + Sync {
    /// `Ok(None)` when the identifier is unknown or inactive.
    async fn fetch(&self, id: &str) -> DirectoryResult<Option<TenantConfig>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Cached tenant lookup shared by every call.
pub struct ClientDirectory {
    source: Arc<dyn TenantSource>,
    cache: TenantCache,
    fetches: AtomicU64,
}

impl std::fmt::Debug for ClientDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDirectory")
            .field("source", &self.source.name())
            .field("cache", &self.cache)
            .finish()
    }
}

impl ClientDirectory {
    pub fn new(source: Arc<dyn TenantSource>, cache: TenantCache) -> Self {
        info!(
            source = source.name(),
            ttl_secs = cache.ttl().as_secs(),
            "Client directory initialized"
        );
        Self {
            source,
            cache,
            fetches: AtomicU64::new(0),
        }
    }

    /// Resolve `id`, hitting the source only on a cache miss.
    pub async fn get_config(&self, id: &str) -> DirectoryResult<Option<Arc<TenantConfig>>> {
        if let Some(config) = self.cache.get(id).await {
            debug!(sip_number = %id, "Tenant cache hit");
            return Ok(Some(config));
        }

        debug!(sip_number = %id, source = self.source.name(), "Tenant cache miss, fetching");
        self.fetches.fetch_add(1, Ordering::Relaxed);

        match self.source.fetch(id).await? {
            Some(config) => {
                let config = Arc::new(config);
                self.cache.insert(id, config.clone()).await;
                info!(
                    sip_number = %id,
                    client = config.client_name.as_deref().unwrap_or("-"),
                    "Tenant configuration loaded"
                );
                Ok(Some(config))
            }
            None => {
                warn!(sip_number = %id, "Tenant not found");
                Ok(None)
            }
        }
    }

    /// Drop one cached entry, or everything when `id` is `None`.
    pub async fn invalidate(&self, id: Option<&str>) {
        match id {
            Some(id) => {
                self.cache.invalidate(id).await;
                info!(sip_number = %id, "Tenant cache entry invalidated");
            }
            None => {
                self.cache.invalidate_all();
                info!("Tenant cache invalidated");
            }
        }
    }

    /// Invalidate then fetch fresh.
    pub async fn refresh(&self, id: &str) -> DirectoryResult<Option<Arc<TenantConfig>>> {
        self.invalidate(Some(id)).await;
        self.get_config(id).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats(self.fetches.load(Ordering::Relaxed)).await
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use parking_lot::Mutex;

    /// In-memory source that counts fetches per identifier.
    #[derive(Default)]
    struct CountingSource {
        tenants: Mutex<HashMap<String, TenantConfig>>,
        calls: Mutex<HashMap<String, usize>>,
        fail: bool,
    }

    impl CountingSource {
        fn with(id: &str, voice: &str) -> Self {
            let source = Self::default();
            source.set(id, voice);
            source
        }

        fn set(&self, id: &str, voice: &str) {
            let config = TenantConfig {
                voice: voice.to_string(),
                ..Default::default()
            };
            self.tenants.lock().insert(id.to_string(), config);
        }

        fn calls(&self, id: &str) -> usize {
            self.calls.lock().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl TenantSource for CountingSource {
        async fn fetch(&self, id: &str) -> DirectoryResult<Option<TenantConfig>> {
            *self.calls.lock().entry(id.to_string()).or_default() += 1;
            if self.fail {
                return Err(DirectoryError::Source("backend down".to_string()));
            }
            Ok(self.tenants.lock().get(id).cloned())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn directory(source: Arc<CountingSource>, ttl: Duration) -> ClientDirectory {
        ClientDirectory::new(source, TenantCache::new(ttl))
    }

    #[tokio::test]
    async fn test_second_lookup_is_a_hit() {
        let source = Arc::new(CountingSource::with("+551100", "alloy"));
        let dir = directory(source.clone(), Duration::from_secs(60));

        let first = dir.get_config("+551100").await.unwrap().unwrap();
        let second = dir.get_config("+551100").await.unwrap().unwrap();
        assert_eq!(first.voice, "alloy");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls("+551100"), 1);

        let stats = dir.cache_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fetches, 1);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let source = Arc::new(CountingSource::default());
        let dir = directory(source.clone(), Duration::from_secs(60));

        assert!(dir.get_config("+1").await.unwrap().is_none());
        source.set("+1", "echo");
        let config = dir.get_config("+1").await.unwrap().unwrap();
        assert_eq!(config.voice, "echo");
        assert_eq!(source.calls("+1"), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_refetched_exactly_once() {
        let source = Arc::new(CountingSource::with("+1", "alloy"));
        let dir = directory(source.clone(), Duration::from_millis(100));

        dir.get_config("+1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        source.set("+1", "shimmer");

        let config = dir.get_config("+1").await.unwrap().unwrap();
        assert_eq!(config.voice, "shimmer");
        dir.get_config("+1").await.unwrap();
        assert_eq!(source.calls("+1"), 2);
    }

    #[tokio::test]
    async fn test_invalidate_one_and_all() {
        let source = Arc::new(CountingSource::with("+1", "alloy"));
        source.set("+2", "echo");
        let dir = directory(source.clone(), Duration::from_secs(60));

        dir.get_config("+1").await.unwrap();
        dir.get_config("+2").await.unwrap();

        dir.invalidate(Some("+1")).await;
        dir.get_config("+1").await.unwrap();
        dir.get_config("+2").await.unwrap();
        assert_eq!(source.calls("+1"), 2);
        assert_eq!(source.calls("+2"), 1);

        dir.invalidate(None).await;
        dir.get_config("+1").await.unwrap();
        dir.get_config("+2").await.unwrap();
        assert_eq!(source.calls("+1"), 3);
        assert_eq!(source.calls("+2"), 2);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let source = Arc::new(CountingSource::with("+1", "alloy"));
        let dir = directory(source.clone(), Duration::from_secs(60));

        dir.get_config("+1").await.unwrap();
        source.set("+1", "coral");
        let refreshed = dir.refresh("+1").await.unwrap().unwrap();
        assert_eq!(refreshed.voice, "coral");
        assert_eq!(source.calls("+1"), 2);
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let source = Arc::new(CountingSource {
            fail: true,
            ..Default::default()
        });
        let dir = directory(source, Duration::from_secs(60));
        let result = dir.get_config("+1").await;
        assert!(matches!(result, Err(DirectoryError::Source(_))));
    }
}
