//! Tenant source backed by a YAML (or JSON) file.
//!
//! The file is a map from identifier to [`TenantConfig`]:
//!
//! ```yaml
//! "+5511999990001":
//!   voice: en-US-Andrew:DragonHDLatestNeural
//!   greeting: "Hello, how can I help?"
//! ```
//!
//! Outside development, `tenants.<env>.yaml` next to the base file wins when
//! it exists. The file is re-read on every miss, so edits show up once the
//! cached entry expires.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use super::tenant::TenantConfig;
use super::{DirectoryError, DirectoryResult, TenantSource};
use crate::config::AppEnv;

#[derive(Debug, Clone)]
pub struct FileTenantSource {
    path: PathBuf,
}

impl FileTenantSource {
    /// Source reading `path` exactly.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Source reading the environment-specific variant of `base` when present.
    pub fn for_env(base: impl AsRef<Path>, env: AppEnv) -> Self {
        Self::new(resolve_env_path(base.as_ref(), env))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> DirectoryResult<HashMap<String, TenantConfig>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        serde_yaml::from_str(&contents).map_err(|e| {
            DirectoryError::Parse(format!("{}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl TenantSource for FileTenantSource {
    async fn fetch(&self, id: &str) -> DirectoryResult<Option<TenantConfig>> {
        let mut tenants = self.load().await?;
        Ok(tenants.remove(id))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// `tenants.yaml` becomes `tenants.staging.yaml` under staging, if that file exists.
pub fn resolve_env_path(base: &Path, env: AppEnv) -> PathBuf {
    if env == AppEnv::Development {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}.{}.{}", env.as_str(), ext.to_string_lossy()),
        None => format!("{stem}.{}", env.as_str()),
    };
    let candidate = base.with_file_name(file_name);

    if candidate.exists() {
        info!(path = %candidate.display(), "Using environment-specific tenant file");
        candidate
    } else {
        warn!(
            missing = %candidate.display(),
            fallback = %base.display(),
            "Environment-specific tenant file not found, using base file"
        );
        base.to_path_buf()
    }
}
