//! Base types for the realtime speech-service session.
//!
//! This module defines the error taxonomy, the reconnection policy and the
//! session state machine states shared by the connector and the worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the speech service.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Error event reported by the service
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Session error
    #[error("Session error: {0}")]
    SessionError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Reconnection
// =============================================================================

/// Retry policy for a dropped or failed speech-service connection.
///
/// After the first failure the worker retries up to `max_attempts` times.
/// Every delay lies within `[initial_delay_ms, max_delay_ms]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    /// Retries allowed after the first failure. Zero disables reconnection.
    /// Default: 3
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds). Also the lower bound.
    /// Default: 500ms
    pub initial_delay_ms: u64,

    /// Upper bound for any delay (milliseconds).
    /// Default: 8000ms
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    /// Default: 2.0
    pub backoff_multiplier: f32,

    /// Add up to 25% random jitter to each delay.
    /// Default: true
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectionConfig {
    /// Create a config with reconnection disabled.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (1-based) in milliseconds.
    ///
    /// `initial_delay_ms * multiplier^(attempt-1)` plus jitter, clamped to
    /// `[initial_delay_ms, max_delay_ms]`.
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base_delay = self.initial_delay_ms as f64;
        let multiplier = (self.backoff_multiplier as f64).max(1.0);

        let delay = base_delay * multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        let delay = if self.jitter {
            delay + rand_jitter(delay * 0.25)
        } else {
            delay
        };

        let (min, max) = self.delay_bounds();
        (delay as u64).clamp(min, max)
    }

    /// Inclusive bounds every delay falls into.
    pub fn delay_bounds(&self) -> (u64, u64) {
        let max = self.max_delay_ms.max(self.initial_delay_ms);
        (self.initial_delay_ms, max)
    }

    /// Check if a retry numbered `attempt` (1-based) is allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }
}

/// Generate a pseudo-random jitter value in `[0, range)` using a simple LCG.
/// This avoids pulling in the rand crate for a simple use case.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // Simple LCG: (a * seed + c) mod m
    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64; // 0.0 to 1.0
    normalized * range
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of one speech session.
///
/// `Connecting` is initial. `Closing` (clean) and `Failed` (reconnect budget
/// exhausted) are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechSessionState {
    #[default]
    Connecting,
    ActiveIdle,
    AgentSpeaking,
    UserSpeaking,
    Closing,
    Failed,
}

impl SpeechSessionState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::ActiveIdle => "active_idle",
            Self::AgentSpeaking => "agent_speaking",
            Self::UserSpeaking => "user_speaking",
            Self::Closing => "closing",
            Self::Failed => "failed",
        }
    }

    /// Connected and configured; audio may flow.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::ActiveIdle | Self::AgentSpeaking | Self::UserSpeaking
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Failed)
    }
}

impl fmt::Display for SpeechSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
