//! Telephony media-stream message types
//!
//! The telephony side sends JSON text frames discriminated by `event`. The
//! stream identifier may appear at the top level (`streamId` or `streamSid`)
//! or inside the `start` object, so frames are read into a loose envelope and
//! then narrowed to a [`TelephonyEvent`].

use serde::{Deserialize, Serialize};

/// Close code sent when no tenant owns the dialed number.
pub const CLOSE_CLIENT_NOT_FOUND: u16 = 4004;

/// Close code sent when the speech session cannot be served.
pub const CLOSE_VOICE_SERVER_ERROR: u16 = 1011;

/// Close code for a normal end of call.
pub const CLOSE_NORMAL: u16 = 1000;

/// Encoding the bridge expects in `start.mediaFormat.encoding`.
pub const EXPECTED_ENCODING: &str = "audio/x-mulaw";

// =============================================================================
// Incoming Messages (telephony -> bridge)
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    event: String,
    #[serde(default, alias = "streamSid")]
    stream_id: Option<String>,
    #[serde(default)]
    start: Option<StartInfo>,
    #[serde(default)]
    media: Option<MediaInfo>,
    #[serde(default)]
    mark: Option<MarkInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartInfo {
    #[serde(default, alias = "streamSid")]
    stream_id: Option<String>,
    #[serde(default)]
    media_format: Option<MediaFormat>,
}

/// Media format announced in the `start` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaInfo {
    #[serde(default)]
    payload: String,
}

#[derive(Debug, Default, Deserialize)]
struct MarkInfo {
    #[serde(default)]
    name: String,
}

/// One inbound telephony event.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyEvent {
    Connected,
    Start {
        stream_id: Option<String>,
        media_format: Option<MediaFormat>,
    },
    /// Base64 μ-law audio
    Media { payload: String },
    Mark { name: String },
    Stop,
    /// Any other event name; ignored
    Unknown(String),
}

impl TelephonyEvent {
    /// Parse a JSON text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Ok(match envelope.event.as_str() {
            "connected" => Self::Connected,
            "start" => {
                let start = envelope.start.unwrap_or_default();
                Self::Start {
                    stream_id: envelope.stream_id.or(start.stream_id),
                    media_format: start.media_format,
                }
            }
            "media" => Self::Media {
                payload: envelope.media.unwrap_or_default().payload,
            },
            "mark" => Self::Mark {
                name: envelope.mark.unwrap_or_default().name,
            },
            "stop" => Self::Stop,
            _ => Self::Unknown(envelope.event),
        })
    }
}

// =============================================================================
// Outgoing Messages (bridge -> telephony)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMedia {
    /// Base64 μ-law audio, one 20 ms chunk
    pub payload: String,
}

/// Outbound telephony event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutgoing {
    Media {
        #[serde(rename = "streamId")]
        stream_id: String,
        media: OutgoingMedia,
    },
    /// Discard audio already buffered on the telephony side
    Clear {
        #[serde(rename = "streamId")]
        stream_id: String,
    },
}

/// Work item for the socket writer task.
#[derive(Debug)]
pub enum TelephonyRoute {
    Outgoing(TelephonyOutgoing),
    Close { code: u16, reason: &'static str },
}
