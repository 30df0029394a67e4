pub mod api;
pub mod telephony;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Every route of the service, bound to `state`.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    api::create_public_router()
        .merge(api::create_api_router())
        .merge(telephony::create_telephony_router())
        .with_state(state)
}
