use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Public routes: health and root
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::root))
        .route("/health", get(api::health_check))
}

/// Client directory administration
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/directory/stats", get(api::directory_stats))
        .route("/directory/cache", delete(api::invalidate_all))
        .route("/directory/cache/{sip_number}", delete(api::invalidate_one))
        .route(
            "/directory/cache/{sip_number}/refresh",
            post(api::refresh_one),
        )
        .layer(TraceLayer::new_for_http())
}
