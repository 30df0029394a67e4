//! Environment variable loading.
//!
//! Produces the base [`ServerConfig`] that YAML values are later applied to.
//! Unset variables keep their defaults; malformed values are errors.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{AppEnv, DirectoryProvider, ServerConfig, TlsConfig};

/// Every variable this module reads.
#[cfg(test)]
pub(super) const ENV_VARS: &[&str] = &[
    "APP_ENV",
    "HOST",
    "PORT",
    "TLS_CERT_PATH",
    "TLS_KEY_PATH",
    "CORS_ALLOWED_ORIGINS",
    "VOICELIVE_ENDPOINT",
    "VOICELIVE_API_KEY",
    "VOICELIVE_MODEL",
    "VOICELIVE_API_VERSION",
    "SESSION_CONNECT_TIMEOUT_MS",
    "BARGE_IN_GRACE_MS",
    "BARGE_IN_DEBOUNCE_MS",
    "RECONNECT_MAX_ATTEMPTS",
    "RECONNECT_INITIAL_DELAY_MS",
    "RECONNECT_MAX_DELAY_MS",
    "DIRECTORY_PROVIDER",
    "TENANTS_PATH",
    "DIRECTORY_URL",
    "SUPABASE_URL",
    "DIRECTORY_API_KEY",
    "SUPABASE_SERVICE_ROLE_KEY",
    "DIRECTORY_CACHE_TTL_SECONDS",
];

/// Non-empty value of the first set variable among `names`.
fn var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(&[name]) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} '{raw}': {e}")),
        None => Ok(None),
    }
}

pub(super) fn load_env_config() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(app_env) = var(&["APP_ENV"]) {
        config.app_env = app_env.parse::<AppEnv>()?;
    }
    if let Some(host) = var(&["HOST"]) {
        config.host = host;
    }
    if let Some(port) = parse_var("PORT")? {
        config.port = port;
    }
    config.tls = match (var(&["TLS_CERT_PATH"]), var(&["TLS_KEY_PATH"])) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    };
    config.cors_allowed_origins = var(&["CORS_ALLOWED_ORIGINS"]);

    // Speech service
    if let Some(endpoint) = var(&["VOICELIVE_ENDPOINT"]) {
        config.speech.endpoint = endpoint;
    }
    if let Some(api_key) = var(&["VOICELIVE_API_KEY"]) {
        config.speech.api_key = api_key;
    }
    if let Some(model) = var(&["VOICELIVE_MODEL"]) {
        config.speech.default_model = model;
    }
    if let Some(version) = var(&["VOICELIVE_API_VERSION"]) {
        config.speech.api_version = version;
    }

    // Session timing
    let session = &mut config.session;
    if let Some(ms) = parse_var("SESSION_CONNECT_TIMEOUT_MS")? {
        session.connect_timeout_ms = ms;
    }
    if let Some(ms) = parse_var("BARGE_IN_GRACE_MS")? {
        session.grace_period_ms = ms;
    }
    if let Some(ms) = parse_var("BARGE_IN_DEBOUNCE_MS")? {
        session.debounce_ms = ms;
    }
    if let Some(attempts) = parse_var("RECONNECT_MAX_ATTEMPTS")? {
        session.reconnect.max_attempts = attempts;
    }
    if let Some(ms) = parse_var("RECONNECT_INITIAL_DELAY_MS")? {
        session.reconnect.initial_delay_ms = ms;
    }
    if let Some(ms) = parse_var("RECONNECT_MAX_DELAY_MS")? {
        session.reconnect.max_delay_ms = ms;
    }

    // Client directory
    let directory = &mut config.directory;
    if let Some(provider) = var(&["DIRECTORY_PROVIDER"]) {
        directory.provider = provider.parse::<DirectoryProvider>()?;
    }
    if let Some(path) = var(&["TENANTS_PATH"]) {
        directory.tenants_path = PathBuf::from(path);
    }
    directory.url = var(&["DIRECTORY_URL", "SUPABASE_URL"]);
    directory.api_key = var(&["DIRECTORY_API_KEY", "SUPABASE_SERVICE_ROLE_KEY"]);
    if let Some(ttl) = parse_var("DIRECTORY_CACHE_TTL_SECONDS")? {
        directory.cache_ttl_seconds = ttl;
    }

    Ok(config)
}
