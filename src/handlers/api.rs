//! Health, root and directory admin handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::directory::{CacheStats, TenantConfig};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub env: &'static str,
    pub worker_status: &'static str,
    pub active_calls: usize,
}

/// Process readiness. Independent of any call in progress.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        env: state.config.app_env.as_str(),
        worker_status: "ready",
        active_calls: state.active_calls(),
    })
}

pub async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Voice agent bridge running" }))
}

#[derive(Debug, Serialize)]
pub struct DirectoryStatsResponse {
    pub source: &'static str,
    #[serde(flatten)]
    pub cache: CacheStats,
}

pub async fn directory_stats(State(state): State<Arc<AppState>>) -> Json<DirectoryStatsResponse> {
    Json(DirectoryStatsResponse {
        source: state.directory.source_name(),
        cache: state.directory.cache_stats().await,
    })
}

pub async fn invalidate_all(State(state): State<Arc<AppState>>) -> StatusCode {
    state.directory.invalidate(None).await;
    StatusCode::NO_CONTENT
}

pub async fn invalidate_one(
    State(state): State<Arc<AppState>>,
    Path(sip_number): Path<String>,
) -> StatusCode {
    state.directory.invalidate(Some(&sip_number)).await;
    StatusCode::NO_CONTENT
}

/// Re-fetch one tenant, bypassing the cache.
pub async fn refresh_one(
    State(state): State<Arc<AppState>>,
    Path(sip_number): Path<String>,
) -> AppResult<Json<TenantConfig>> {
    match state.directory.refresh(&sip_number).await? {
        Some(config) => {
            info!(sip_number = %sip_number, "Tenant configuration refreshed");
            Ok(Json(config.as_ref().clone()))
        }
        None => Err(AppError::NotFound(sip_number)),
    }
}
