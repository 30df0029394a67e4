//! Application state shared by every handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::config::{DirectoryProvider, ServerConfig};
use crate::core::realtime::{RealtimeError, SpeechConnector, WebSocketConnector};
use crate::directory::{
    ClientDirectory, DirectoryError, FileTenantSource, RestTenantSource, TenantCache,
    TenantSource,
};

/// Failure to assemble the application state at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Speech service misconfigured: {0}")]
    Speech(#[from] RealtimeError),

    #[error("Client directory misconfigured: {0}")]
    Directory(#[from] DirectoryError),
}

pub struct AppState {
    pub config: ServerConfig,
    pub directory: Arc<ClientDirectory>,
    pub connector: Arc<dyn SpeechConnector>,
    active_calls: AtomicUsize,
}

impl AppState {
    /// Build the state from configuration: the tenant source selected by
    /// `directory.provider` behind a TTL cache, and a WebSocket connector to
    /// the speech service.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StartupError> {
        let settings = &config.directory;
        let source: Arc<dyn TenantSource> = match settings.provider {
            DirectoryProvider::File => Arc::new(FileTenantSource::for_env(
                &settings.tenants_path,
                config.app_env,
            )),
            DirectoryProvider::Rest => Arc::new(RestTenantSource::new(
                settings.url.clone().unwrap_or_default(),
                settings.api_key.clone().unwrap_or_default(),
            )?),
        };
        let cache = TenantCache::new(Duration::from_secs(settings.cache_ttl_seconds));
        let directory = Arc::new(ClientDirectory::new(source, cache));

        let connector: Arc<dyn SpeechConnector> =
            Arc::new(WebSocketConnector::new(config.speech.clone())?);

        info!(
            env = %config.app_env,
            directory = directory.source_name(),
            cache_ttl_seconds = settings.cache_ttl_seconds,
            "Application state initialized"
        );

        Ok(Self::with_parts(config, directory, connector))
    }

    /// Assemble the state from prebuilt collaborators.
    pub fn with_parts(
        config: ServerConfig,
        directory: Arc<ClientDirectory>,
        connector: Arc<dyn SpeechConnector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            directory,
            connector,
            active_calls: AtomicUsize::new(0),
        })
    }

    /// Count a call as active until the returned guard is dropped.
    pub fn begin_call(self: &Arc<Self>) -> CallGuard {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
        CallGuard {
            state: Arc::clone(self),
        }
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }
}

/// Keeps a call counted in [`AppState::active_calls`].
pub struct CallGuard {
    state: Arc<AppState>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.state.active_calls.fetch_sub(1, Ordering::Relaxed);
    }
}
