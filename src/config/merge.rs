//! Apply YAML values on top of the environment-derived configuration.

use std::path::PathBuf;

use super::env::load_env_config;
use super::yaml::YamlConfig;
use super::{AppEnv, DirectoryProvider, ServerConfig, TlsConfig};

/// Build the final configuration: environment and defaults first, then every
/// value present in `yaml`.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_env_config()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(app_env) = server.app_env {
            config.app_env = app_env.parse::<AppEnv>()?;
        }
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            config.tls = match (tls.cert_path, tls.key_path) {
                (Some(cert), Some(key)) => Some(TlsConfig {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                }),
                (None, None) => config.tls.take(),
                _ => return Err("server.tls requires both cert_path and key_path".into()),
            };
        }
    }

    if let Some(security) = yaml.security
        && let Some(origins) = security.cors_allowed_origins
    {
        config.cors_allowed_origins = Some(origins);
    }

    if let Some(speech) = yaml.speech {
        if let Some(endpoint) = speech.endpoint {
            config.speech.endpoint = endpoint;
        }
        if let Some(api_key) = speech.api_key {
            config.speech.api_key = api_key;
        }
        if let Some(model) = speech.model {
            config.speech.default_model = model;
        }
        if let Some(version) = speech.api_version {
            config.speech.api_version = version;
        }
    }

    if let Some(session) = yaml.session {
        let tuning = &mut config.session;
        if let Some(ms) = session.connect_timeout_ms {
            tuning.connect_timeout_ms = ms;
        }
        if let Some(ms) = session.grace_period_ms {
            tuning.grace_period_ms = ms;
        }
        if let Some(ms) = session.debounce_ms {
            tuning.debounce_ms = ms;
        }
        if let Some(reconnect) = session.reconnect {
            let policy = &mut tuning.reconnect;
            if let Some(attempts) = reconnect.max_attempts {
                policy.max_attempts = attempts;
            }
            if let Some(ms) = reconnect.initial_delay_ms {
                policy.initial_delay_ms = ms;
            }
            if let Some(ms) = reconnect.max_delay_ms {
                policy.max_delay_ms = ms;
            }
            if let Some(multiplier) = reconnect.backoff_multiplier {
                policy.backoff_multiplier = multiplier;
            }
            if let Some(jitter) = reconnect.jitter {
                policy.jitter = jitter;
            }
        }
    }

    if let Some(directory) = yaml.directory {
        let settings = &mut config.directory;
        if let Some(provider) = directory.provider {
            settings.provider = provider.parse::<DirectoryProvider>()?;
        }
        if let Some(path) = directory.tenants_path {
            settings.tenants_path = PathBuf::from(path);
        }
        if let Some(url) = directory.url {
            settings.url = Some(url);
        }
        if let Some(api_key) = directory.api_key {
            settings.api_key = Some(api_key);
        }
        if let Some(ttl) = directory.cache_ttl_seconds {
            settings.cache_ttl_seconds = ttl;
        }
    }

    Ok(config)
}
