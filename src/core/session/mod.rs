//! Speech session for one call.
//!
//! [`SpeechSessionWorker`] owns the connection to the speech service, tracks
//! whether the agent or the caller is speaking, and performs barge-in.
//! [`SessionTuning`] holds the process-wide timing knobs; the per-call agent
//! settings come from the tenant's [`TenantConfig`].

mod worker;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::realtime::{
    AudioFormat, EchoCancellation, NoiseReductionConfig, ReconnectionConfig, SessionConfig,
    TurnDetection, VoiceConfig,
};
use crate::directory::TenantConfig;

pub use worker::{SpeechSessionWorker, WorkerOutput};

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 1_500;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Timing for every speech session in the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    /// Bound on connect plus session acknowledgment
    pub connect_timeout_ms: u64,
    /// Speech-started events are ignored this long after session start or a greeting
    pub grace_period_ms: u64,
    /// Speech-started events closer than this to the last accepted one are collapsed
    pub debounce_ms: u64,
    pub reconnect: ReconnectionConfig,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            reconnect: ReconnectionConfig::default(),
        }
    }
}

impl SessionTuning {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Build the `session.update` payload for a tenant.
///
/// The bridge always exchanges PCM16 with the service; any other format in
/// the tenant record is overridden with a warning.
pub fn build_session_config(tenant: &TenantConfig) -> SessionConfig {
    for (direction, format) in [
        ("input", tenant.audio.input_format),
        ("output", tenant.audio.output_format),
    ] {
        if format != AudioFormat::Pcm16 {
            warn!(
                direction,
                requested = %format,
                "Bridge requires pcm16 on the service leg, overriding tenant format"
            );
        }
    }

    let echo_cancellation = tenant
        .audio
        .echo_cancellation
        .then(EchoCancellation::default);

    SessionConfig {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(tenant.instructions.clone()),
        voice: Some(VoiceConfig::for_name(&tenant.voice)),
        input_audio_format: Some(AudioFormat::Pcm16),
        output_audio_format: Some(AudioFormat::Pcm16),
        turn_detection: Some(TurnDetection::ServerVad {
            threshold: Some(tenant.turn_detection.threshold),
            prefix_padding_ms: Some(tenant.turn_detection.prefix_padding_ms),
            silence_duration_ms: Some(tenant.turn_detection.silence_duration_ms),
        }),
        input_audio_echo_cancellation: echo_cancellation,
        input_audio_noise_reduction: NoiseReductionConfig::from_setting(
            tenant.audio.noise_reduction,
        ),
        input_audio_transcription: None,
        temperature: Some(tenant.temperature),
        max_response_output_tokens: Some(tenant.max_tokens),
    }
}
