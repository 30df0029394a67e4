//! Audio Test Fixtures
//!
//! Generated audio keeps inputs reproducible and free of file dependencies.
//!
//! - Telephony side: μ-law, 8 kHz mono, 160-byte frames (20 ms)
//! - Service side: PCM16 little-endian, 24 kHz mono

use std::f32::consts::PI;

use callbridge_gateway::core::transcoder::mulaw;

pub const TELEPHONY_RATE: u32 = 8000;
pub const SERVICE_RATE: u32 = 24000;

/// One 20 ms telephony frame in bytes.
pub const TELEPHONY_FRAME: usize = 160;

/// Sine tone as samples.
pub fn sine_samples(sample_rate: u32, samples: usize, frequency: f32, amplitude: f32) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    let angular_freq = 2.0 * PI * frequency / sample_rate as f32;
    (0..samples)
        .map(|i| ((angular_freq * i as f32).sin() * max_amplitude) as i16)
        .collect()
}

/// `frames` telephony frames of a 440 Hz μ-law tone.
pub fn mulaw_tone(frames: usize) -> Vec<u8> {
    let samples = sine_samples(TELEPHONY_RATE, frames * TELEPHONY_FRAME, 440.0, 0.3);
    let mut out = Vec::with_capacity(samples.len());
    mulaw::encode(&samples, &mut out);
    out
}

/// `ms` milliseconds of a 24 kHz PCM16 tone.
pub fn pcm16_tone(ms: usize) -> Vec<u8> {
    let samples = sine_samples(SERVICE_RATE, SERVICE_RATE as usize * ms / 1000, 300.0, 0.3);
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
