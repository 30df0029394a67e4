//! Configuration module for the call bridge
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use callbridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use zeroize::Zeroize;

use crate::core::realtime::SpeechServiceConfig;
use crate::core::session::SessionTuning;

mod env;
mod merge;
mod validation;
mod yaml;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TENANTS_PATH: &str = "config/tenants.yaml";
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Deployment environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Staging,
    Production,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "Invalid APP_ENV '{other}': expected development, staging or production"
            )),
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Where tenant records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectoryProvider {
    /// Local YAML file, see [`crate::directory::file`]
    #[default]
    File,
    /// PostgREST-style HTTP backend, see [`crate::directory::rest`]
    Rest,
}

impl FromStr for DirectoryProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "yaml" => Ok(Self::File),
            "rest" | "supabase" => Ok(Self::Rest),
            other => Err(format!(
                "Invalid directory provider '{other}': expected file or rest"
            )),
        }
    }
}

/// Client directory settings
#[derive(Clone, PartialEq)]
pub struct DirectorySettings {
    pub provider: DirectoryProvider,
    /// Base tenants file for the file provider
    pub tenants_path: PathBuf,
    /// REST backend base URL
    pub url: Option<String>,
    /// REST backend service key
    pub api_key: Option<String>,
    pub cache_ttl_seconds: u64,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            provider: DirectoryProvider::File,
            tenants_path: PathBuf::from(DEFAULT_TENANTS_PATH),
            url: None,
            api_key: None,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }
}

impl fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("provider", &self.provider)
            .field("tenants_path", &self.tenants_path)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .finish()
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the bridge:
/// - Server settings (environment, host, port, TLS, CORS)
/// - Speech service endpoint and credential
/// - Session timing and reconnection policy
/// - Client directory source and cache TTL
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub app_env: AppEnv,
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// CORS allowed origins (comma-separated list or "*" for all).
    /// `None` serves same-origin only.
    pub cors_allowed_origins: Option<String>,

    pub speech: SpeechServiceConfig,
    pub session: SessionTuning,
    pub directory: DirectorySettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            app_env: AppEnv::default(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            cors_allowed_origins: None,
            speech: SpeechServiceConfig::new("", ""),
            session: SessionTuning::default(),
            directory: DirectorySettings::default(),
        }
    }
}

/// Zeroize the directory key when the configuration is dropped.
/// The speech credential zeroizes itself.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.directory.api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Expects `.env` to have been loaded already (see `main.rs`).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Whether the speech service can be reached at all.
    pub fn has_speech_credentials(&self) -> bool {
        !self.speech.endpoint.trim().is_empty() && !self.speech.api_key.is_empty()
    }
}
