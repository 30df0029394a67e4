//! Per-call audio transcoding between the telephony leg and the speech service.
//!
//! The telephony side carries G.711 μ-law at 8 kHz; the speech service takes
//! 16-bit little-endian linear PCM at 24 kHz. An [`AudioTranscoder`] owns the
//! filter memory and buffers for both directions of exactly one call:
//!
//! - **uplink**: μ-law → PCM16 @ 8 kHz → resample to 24 kHz
//! - **downlink**: accumulate PCM16 @ 24 kHz → cut 20 ms units → resample to
//!   8 kHz → μ-law → jitter buffer → fixed 20 ms chunks (160 bytes)
//!
//! State is never shared between directions or calls. Call [`AudioTranscoder::clear`]
//! on barge-in and at teardown so no residue of a cancelled turn is emitted.
//!
//! # Example
//!
//! ```rust
//! use callbridge_gateway::core::transcoder::AudioTranscoder;
//!
//! let mut transcoder = AudioTranscoder::new();
//! let pcm = transcoder.uplink(&[0xFF; 160]).unwrap();
//! assert_eq!(pcm.len() % 2, 0);
//!
//! let chunks = transcoder.downlink(&vec![0u8; 1920]);
//! assert!(chunks.iter().all(|c| c.len() == 160));
//! ```

pub mod jitter;
pub mod mulaw;
pub mod resampler;

use base64::prelude::*;
use bytes::Bytes;

pub use jitter::{JitterBuffer, PcmAccumulator};
pub use resampler::{LinearResampler, ResampleState};

/// Telephony leg sample rate (G.711).
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Speech service sample rate (PCM16).
pub const SERVICE_SAMPLE_RATE: u32 = 24000;

/// Duration of one output unit in milliseconds.
pub const FRAME_DURATION_MS: u32 = 20;

/// One 20 ms telephony chunk: 160 μ-law bytes.
pub const TELEPHONY_CHUNK_BYTES: usize = 160;

/// One 20 ms service unit: 480 samples of PCM16.
pub const SERVICE_UNIT_BYTES: usize = 960;

/// Rates and unit duration for one transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscoderConfig {
    pub telephony_rate: u32,
    pub service_rate: u32,
    pub frame_ms: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            telephony_rate: TELEPHONY_SAMPLE_RATE,
            service_rate: SERVICE_SAMPLE_RATE,
            frame_ms: FRAME_DURATION_MS,
        }
    }
}

impl TranscoderConfig {
    /// μ-law bytes per output chunk (one byte per sample).
    pub fn telephony_chunk_bytes(&self) -> usize {
        (self.telephony_rate * self.frame_ms / 1000).max(1) as usize
    }

    /// PCM16 bytes per downlink unit (two bytes per sample).
    pub fn service_unit_bytes(&self) -> usize {
        (self.service_rate * self.frame_ms / 1000).max(1) as usize * 2
    }
}

/// Stateful bidirectional codec and resampler for one call.
#[derive(Debug)]
pub struct AudioTranscoder {
    config: TranscoderConfig,
    uplink_resampler: LinearResampler,
    downlink_resampler: LinearResampler,
    accumulator: PcmAccumulator,
    jitter: JitterBuffer,
    // Scratch buffers reused across frames
    pcm_scratch: Vec<i16>,
    resampled_scratch: Vec<i16>,
    encoded_scratch: Vec<u8>,
}

impl Default for AudioTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTranscoder {
    /// Transcoder for μ-law 8 kHz ↔ PCM16 24 kHz with 20 ms units.
    pub fn new() -> Self {
        Self::with_config(TranscoderConfig::default())
    }

    pub fn with_config(config: TranscoderConfig) -> Self {
        Self {
            uplink_resampler: LinearResampler::new(config.telephony_rate, config.service_rate),
            downlink_resampler: LinearResampler::new(config.service_rate, config.telephony_rate),
            accumulator: PcmAccumulator::new(config.service_unit_bytes()),
            jitter: JitterBuffer::new(config.telephony_chunk_bytes()),
            pcm_scratch: Vec::new(),
            resampled_scratch: Vec::new(),
            encoded_scratch: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Convert one telephony frame (raw μ-law) to service PCM16 bytes.
    ///
    /// Returns `None` when nothing is ready to forward (empty input, or the
    /// first sample held back as resampler lookahead).
    pub fn uplink(&mut self, frame: &[u8]) -> Option<Bytes> {
        if frame.is_empty() {
            return None;
        }

        self.pcm_scratch.clear();
        mulaw::decode(frame, &mut self.pcm_scratch);

        self.resampled_scratch.clear();
        self.uplink_resampler
            .process(&self.pcm_scratch, &mut self.resampled_scratch);

        if self.resampled_scratch.is_empty() {
            return None;
        }
        Some(samples_to_le_bytes(&self.resampled_scratch))
    }

    /// Convert a base64 telephony payload. Undecodable payloads yield `None`.
    pub fn uplink_base64(&mut self, payload: &str) -> Option<Bytes> {
        let frame = decode_base64_payload(payload)?;
        self.uplink(&frame)
    }

    /// Feed service PCM16 bytes and collect every ready telephony chunk.
    ///
    /// The result may be empty while audio accumulates, or hold several chunks
    /// after a burst. Every returned chunk is exactly one telephony unit long.
    pub fn downlink(&mut self, frame: &[u8]) -> Vec<Bytes> {
        self.accumulator.push(frame);

        let mut ready = Vec::new();
        while let Some(unit) = self.accumulator.next_unit() {
            self.pcm_scratch.clear();
            le_bytes_to_samples(&unit, &mut self.pcm_scratch);

            self.resampled_scratch.clear();
            self.downlink_resampler
                .process(&self.pcm_scratch, &mut self.resampled_scratch);

            self.encoded_scratch.clear();
            mulaw::encode(&self.resampled_scratch, &mut self.encoded_scratch);

            self.jitter.push(&self.encoded_scratch);
            self.jitter.drain_ready(&mut ready);
        }
        ready
    }

    /// Reset both filter states, the accumulator, the carry byte and the jitter buffer.
    pub fn clear(&mut self) {
        self.uplink_resampler.reset();
        self.downlink_resampler.reset();
        self.accumulator.clear();
        self.jitter.clear();
    }

    /// Whether no downlink audio is buffered.
    pub fn is_drained(&self) -> bool {
        self.accumulator.is_empty() && self.jitter.is_empty()
    }

    /// Downlink bytes held back (service PCM plus encoded telephony bytes).
    pub fn buffered_bytes(&self) -> usize {
        self.accumulator.len() + self.jitter.len()
    }

    pub fn uplink_state(&self) -> ResampleState {
        self.uplink_resampler.state()
    }

    pub fn downlink_state(&self) -> ResampleState {
        self.downlink_resampler.state()
    }
}

/// Sanitize and decode a base64 audio payload.
///
/// Non-ASCII characters are dropped and surrounding whitespace trimmed.
/// Lengths of the form `4n + 1` can never be valid and are rejected;
/// otherwise missing `=` padding is restored before decoding.
pub fn decode_base64_payload(payload: &str) -> Option<Vec<u8>> {
    let ascii: String = payload.chars().filter(char::is_ascii).collect();
    let cleaned = ascii.trim();

    if cleaned.is_empty() || cleaned.len() % 4 == 1 {
        return None;
    }

    let mut padded = cleaned.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    BASE64_STANDARD.decode(padded.as_bytes()).ok()
}

fn samples_to_le_bytes(samples: &[i16]) -> Bytes {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(bytes)
}

fn le_bytes_to_samples(bytes: &[u8], out: &mut Vec<i16>) {
    out.reserve(bytes.len() / 2);
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
    );
}
