//! Realtime speech-service protocol.
//!
//! The service speaks the realtime audio-to-audio protocol over a WebSocket:
//! the client configures a session with `session.update`, streams caller audio
//! with `input_audio_buffer.append`, and receives speech-detection events and
//! synthesized audio deltas back.
//!
//! - [`base`]: error taxonomy, reconnection policy, session states
//! - [`config`]: endpoint settings and closed audio-format enums
//! - [`messages`]: client and server event types
//! - [`connector`]: the connection seam used by the session worker

pub mod base;
pub mod config;
pub mod connector;
pub mod messages;

pub use base::{RealtimeError, RealtimeResult, ReconnectionConfig, SpeechSessionState};
pub use config::{
    AudioFormat, DEFAULT_REALTIME_MODEL, DEFAULT_VOICE, NoiseReduction, SpeechServiceConfig,
    VOICELIVE_DEFAULT_API_VERSION,
};
pub use connector::{ConnectRequest, SpeechConnector, SpeechLink, WebSocketConnector};
pub use messages::{
    ApiError, ClientEvent, EchoCancellation, InputAudioTranscription, NoiseReductionConfig,
    ResponseConfig, ServerEvent, SessionConfig, TurnDetection, VoiceConfig,
};
