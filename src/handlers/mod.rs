//! HTTP and WebSocket request handlers
//!
//! - `api` - health check, root and client directory administration
//! - `telephony` - per-call media-stream bridge

pub mod api;
pub mod telephony;

pub use telephony::telephony_handler;
