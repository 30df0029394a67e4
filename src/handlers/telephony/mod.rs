//! Telephony media-stream bridge
//!
//! # Protocol
//!
//! ## Telephony → Bridge
//!
//! - **connected**: transport is up
//! - **start**: carries the stream id used to address outbound frames
//! - **media**: base64 μ-law audio at 8 kHz
//! - **mark**: playback marker, logged only
//! - **stop**: call ended
//!
//! ## Bridge → Telephony
//!
//! - **media**: one 20 ms μ-law chunk (160 bytes before base64)
//! - **clear**: discard buffered audio after a barge-in
//!
//! Close codes: 4004 unknown number, 1011 speech service failure, 1000 normal.

mod handler;
pub mod messages;

pub use handler::telephony_handler;
