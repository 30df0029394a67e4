//! Telephony WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::telephony::telephony_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the telephony media-stream router
///
/// # Endpoint
///
/// `GET /ws/audio/{sip_number}` - WebSocket upgrade for one call to `sip_number`
///
/// # Example
///
/// ```json
/// // Telephony sends
/// {"event": "start", "streamId": "MZ123", "start": {"mediaFormat": {"encoding": "audio/x-mulaw"}}}
/// {"event": "media", "media": {"payload": "<base64 μ-law>"}}
///
/// // Bridge answers with
/// {"event": "media", "streamId": "MZ123", "media": {"payload": "<base64 μ-law>"}}
/// {"event": "clear", "streamId": "MZ123"}
/// ```
pub fn create_telephony_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/audio/{sip_number}", get(telephony_handler))
        .layer(TraceLayer::new_for_http())
}
