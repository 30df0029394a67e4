use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   app_env: "production"
///   host: "0.0.0.0"
///   port: 8000
///   tls:
///     cert_path: "/etc/bridge/cert.pem"
///     key_path: "/etc/bridge/key.pem"
///
/// security:
///   cors_allowed_origins: "https://console.example.com"
///
/// speech:
///   endpoint: "https://my-resource.services.ai.azure.com"
///   api_key: "your-api-key"
///   model: "gpt-realtime"
///   api_version: "2025-10-01"
///
/// session:
///   connect_timeout_ms: 10000
///   grace_period_ms: 1500
///   debounce_ms: 300
///   reconnect:
///     max_attempts: 3
///     initial_delay_ms: 500
///     max_delay_ms: 8000
///
/// directory:
///   provider: "rest"
///   url: "https://project.supabase.co"
///   api_key: "service-role-key"
///   cache_ttl_seconds: 300
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub security: Option<SecurityYaml>,
    pub speech: Option<SpeechYaml>,
    pub session: Option<SessionYaml>,
    pub directory: Option<DirectoryYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub app_env: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
}

/// Speech service connection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeechYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Model used when a tenant names none
    pub model: Option<String>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub connect_timeout_ms: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub reconnect: Option<ReconnectYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReconnectYaml {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f32>,
    pub jitter: Option<bool>,
}

/// Client directory from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DirectoryYaml {
    /// "file" or "rest"
    pub provider: Option<String>,
    pub tenants_path: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub cache_ttl_seconds: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  app_env: "staging"
  host: "127.0.0.1"
  port: 3001
  tls:
    cert_path: "/certs/cert.pem"
    key_path: "/certs/key.pem"
security:
  cors_allowed_origins: "*"
speech:
  endpoint: "https://voice.example.com"
  api_key: "k"
  model: "gpt-realtime-mini"
session:
  grace_period_ms: 1000
  reconnect:
    max_attempts: 2
    jitter: false
directory:
  provider: "file"
  tenants_path: "tenants.yaml"
  cache_ttl_seconds: 120
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.app_env.as_deref(), Some("staging"));
        assert_eq!(server.port, Some(3001));
        assert_eq!(
            server.tls.unwrap().key_path.as_deref(),
            Some("/certs/key.pem")
        );
        assert_eq!(
            config.security.unwrap().cors_allowed_origins.as_deref(),
            Some("*")
        );
        assert_eq!(
            config.speech.unwrap().model.as_deref(),
            Some("gpt-realtime-mini")
        );
        let session = config.session.unwrap();
        assert_eq!(session.grace_period_ms, Some(1000));
        assert_eq!(session.debounce_ms, None);
        let reconnect = session.reconnect.unwrap();
        assert_eq!(reconnect.max_attempts, Some(2));
        assert_eq!(reconnect.jitter, Some(false));
        assert_eq!(config.directory.unwrap().cache_ttl_seconds, Some(120));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.speech.is_none());
        assert!(config.directory.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: 9000\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.server.unwrap().port, Some(9000));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(&PathBuf::from("/nonexistent/bridge.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_wrong_type() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: \"not a number\"\n").unwrap();

        let result = YamlConfig::from_file(&path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML config")
        );
    }
}
