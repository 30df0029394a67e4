//! Per-tenant agent configuration.

use serde::{Deserialize, Serialize};

use crate::core::realtime::{AudioFormat, DEFAULT_REALTIME_MODEL, DEFAULT_VOICE, NoiseReduction};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 800;
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";
pub const DEFAULT_GREETING_DELAY_MS: u64 = 500;

/// Agent configuration for one telephony identifier.
///
/// Every field has a default, so partial records from any source load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Display name of the owning client, when the source knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub instructions: String,
    pub turn_detection: TurnDetectionSettings,
    #[serde(alias = "audio_config")]
    pub audio: AudioSettings,
    /// Text spoken by the agent right after the session is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    pub greeting_delay_ms: u64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            client_name: None,
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            turn_detection: TurnDetectionSettings::default(),
            audio: AudioSettings::default(),
            greeting: None,
            greeting_delay_ms: DEFAULT_GREETING_DELAY_MS,
        }
    }
}

impl TenantConfig {
    /// Greeting text, if configured and not blank.
    pub fn greeting_text(&self) -> Option<&str> {
        self.greeting
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }
}

/// Server-side turn detection sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnDetectionSettings {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetectionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 100,
            silence_duration_ms: 500,
        }
    }
}

/// Audio processing requested from the speech service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub input_format: AudioFormat,
    pub output_format: AudioFormat,
    pub echo_cancellation: bool,
    pub noise_reduction: NoiseReduction,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            input_format: AudioFormat::Pcm16,
            output_format: AudioFormat::Pcm16,
            echo_cancellation: true,
            noise_reduction: NoiseReduction::AzureDeepNoiseSuppression,
        }
    }
}
