//! G.711 μ-law codec (ITU-T G.711, 14-bit magnitude with bias 0x84).

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Decode table for all 256 μ-law code words.
static DECODE_TABLE: [i16; 256] = build_decode_table();

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode_sample(i as u8);
        i += 1;
    }
    table
}

/// Decode a single μ-law byte to a 16-bit linear sample.
pub const fn decode_sample(byte: u8) -> i16 {
    let code = !byte;
    let exponent = ((code >> 4) & 0x07) as i32;
    let mantissa = (code & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if code & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a single 16-bit linear sample to μ-law.
pub fn encode_sample(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };

    let pcm = pcm.min(CLIP) + BIAS;
    // pcm >= 0x84, so the highest set bit is in 7..=14
    let exponent = (31 - (pcm as u32).leading_zeros()) as i32 - 7;
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Decode a μ-law buffer into linear samples, appending to `out`.
pub fn decode(input: &[u8], out: &mut Vec<i16>) {
    out.reserve(input.len());
    out.extend(input.iter().map(|&b| DECODE_TABLE[b as usize]));
}

/// Encode linear samples into μ-law bytes, appending to `out`.
pub fn encode(input: &[i16], out: &mut Vec<u8>) {
    out.reserve(input.len());
    out.extend(input.iter().map(|&s| encode_sample(s)));
}
