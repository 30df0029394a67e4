use super::{DirectoryProvider, ServerConfig};

/// Reject configurations the bridge cannot run with.
///
/// Speech credentials are checked later, when the connector is built.
pub(super) fn validate(config: &ServerConfig) -> Result<(), String> {
    if config.port == 0 {
        return Err("PORT must be non-zero".to_string());
    }

    let reconnect = &config.session.reconnect;
    if reconnect.initial_delay_ms > reconnect.max_delay_ms {
        return Err(format!(
            "RECONNECT_INITIAL_DELAY_MS ({}) must not exceed RECONNECT_MAX_DELAY_MS ({})",
            reconnect.initial_delay_ms, reconnect.max_delay_ms
        ));
    }
    if reconnect.backoff_multiplier.is_nan() || reconnect.backoff_multiplier < 1.0 {
        return Err(format!(
            "Reconnect backoff multiplier must be at least 1.0, got {}",
            reconnect.backoff_multiplier
        ));
    }

    let directory = &config.directory;
    if directory.cache_ttl_seconds == 0 {
        return Err("DIRECTORY_CACHE_TTL_SECONDS must be greater than zero".to_string());
    }
    if directory.provider == DirectoryProvider::Rest {
        if directory.url.as_deref().is_none_or(str::is_empty) {
            return Err("Directory provider 'rest' requires DIRECTORY_URL".to_string());
        }
        if directory.api_key.as_deref().is_none_or(str::is_empty) {
            return Err("Directory provider 'rest' requires DIRECTORY_API_KEY".to_string());
        }
    }

    Ok(())
}
