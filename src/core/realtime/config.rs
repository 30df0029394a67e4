//! Speech-service connection settings and closed format enums.
//!
//! Format and noise-reduction names arrive as strings from tenant
//! configuration. They are parsed into enums once, at load time; unknown
//! names fall back to a documented default with a warning.

use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroize;

use super::base::{RealtimeError, RealtimeResult};

/// Realtime WebSocket path under the service endpoint.
pub const VOICELIVE_REALTIME_PATH: &str = "/voice-live/realtime";

/// Default API version query parameter.
pub const VOICELIVE_DEFAULT_API_VERSION: &str = "2025-10-01";

/// Default realtime model.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Default voice name.
pub const DEFAULT_VOICE: &str = "en-US-Andrew:DragonHDLatestNeural";

/// Sample rate of PCM16 audio on the service leg.
pub const SERVICE_PCM16_SAMPLE_RATE: u32 = 24000;

// =============================================================================
// Audio Formats
// =============================================================================

/// Audio formats the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AudioFormat {
    /// PCM 16-bit signed little-endian, 24kHz mono (default)
    #[default]
    Pcm16,
    /// G.711 μ-law, 8kHz
    G711Ulaw,
    /// G.711 A-law, 8kHz
    G711Alaw,
}

impl AudioFormat {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }

    /// Parse a format name, falling back to PCM16 with a warning.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pcm16" | "pcm" => Self::Pcm16,
            "g711_ulaw" | "ulaw" | "mulaw" => Self::G711Ulaw,
            "g711_alaw" | "alaw" => Self::G711Alaw,
            other => {
                tracing::warn!(
                    format = %other,
                    fallback = %Self::default(),
                    "Unknown audio format, using default"
                );
                Self::default()
            }
        }
    }

    /// Sample rate for this format.
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Pcm16 => SERVICE_PCM16_SAMPLE_RATE,
            Self::G711Ulaw | Self::G711Alaw => 8000,
        }
    }
}

impl From<String> for AudioFormat {
    fn from(value: String) -> Self {
        Self::from_str_or_default(&value)
    }
}

impl From<AudioFormat> for String {
    fn from(value: AudioFormat) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Noise Reduction
// =============================================================================

/// Input noise suppression applied by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NoiseReduction {
    #[default]
    AzureDeepNoiseSuppression,
    NearField,
    FarField,
    /// No noise reduction requested
    Disabled,
}

impl NoiseReduction {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureDeepNoiseSuppression => "azure_deep_noise_suppression",
            Self::NearField => "near_field_noise_reduction",
            Self::FarField => "far_field_noise_reduction",
            Self::Disabled => "none",
        }
    }

    /// Parse a noise-reduction name, falling back to deep suppression with a warning.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "azure_deep_noise_suppression" | "deep" => Self::AzureDeepNoiseSuppression,
            "near_field_noise_reduction" | "near_field" => Self::NearField,
            "far_field_noise_reduction" | "far_field" => Self::FarField,
            "" | "none" | "off" | "disabled" => Self::Disabled,
            other => {
                tracing::warn!(
                    noise_reduction = %other,
                    fallback = %Self::default(),
                    "Unknown noise reduction type, using default"
                );
                Self::default()
            }
        }
    }

    /// Wire type name, or `None` when disabled.
    pub fn wire_type(&self) -> Option<&'static str> {
        match self {
            Self::Disabled => None,
            other => Some(other.as_str()),
        }
    }
}

impl From<String> for NoiseReduction {
    fn from(value: String) -> Self {
        Self::from_str_or_default(&value)
    }
}

impl From<NoiseReduction> for String {
    fn from(value: NoiseReduction) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for NoiseReduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Service Endpoint
// =============================================================================

/// Where and how to reach the speech service.
#[derive(Clone, Default)]
pub struct SpeechServiceConfig {
    /// Base endpoint, e.g. `https://my-resource.services.ai.azure.com`
    pub endpoint: String,
    /// API key sent in the `api-key` header
    pub api_key: String,
    /// `api-version` query parameter
    pub api_version: String,
    /// Model used when a tenant names none
    pub default_model: String,
}

impl std::fmt::Debug for SpeechServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl Drop for SpeechServiceConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl SpeechServiceConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: VOICELIVE_DEFAULT_API_VERSION.to_string(),
            default_model: DEFAULT_REALTIME_MODEL.to_string(),
        }
    }

    /// `model`, or the configured default when blank.
    pub fn resolve_model<'a>(&'a self, model: &'a str) -> &'a str {
        let model = model.trim();
        if model.is_empty() {
            &self.default_model
        } else {
            model
        }
    }

    /// Build the realtime WebSocket URL for `model`.
    ///
    /// `https`/`http` endpoints are mapped to `wss`/`ws`.
    pub fn websocket_url(&self, model: &str) -> RealtimeResult<Url> {
        if self.endpoint.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "speech service endpoint is not configured".to_string(),
            ));
        }

        let mut url = Url::parse(self.endpoint.trim()).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("invalid endpoint URL: {e}"))
        })?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(RealtimeError::InvalidConfiguration(format!(
                    "unsupported endpoint scheme '{other}'"
                )));
            }
        };
        url.set_scheme(scheme).map_err(|_| {
            RealtimeError::InvalidConfiguration("cannot set WebSocket scheme".to_string())
        })?;

        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{VOICELIVE_REALTIME_PATH}"));
        url.query_pairs_mut()
            .clear()
            .append_pair("api-version", &self.api_version)
            .append_pair("model", model);

        Ok(url)
    }
}
