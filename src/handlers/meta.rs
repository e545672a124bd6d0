//! Identity, stats, and thin wrappers over single store operations.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::utils::validation::is_valid_pool_name;
use crate::{AppState, AIO_CONCURRENT, MAX_CHUNK_SIZE};

pub async fn whoareyou() -> &'static str {
    "I AM WUZEI"
}

pub async fn cache_stats(State(state): State<AppState>) -> String {
    state.cache.stats_text()
}

/// Current admission-queue depth.
pub async fn threads(State(state): State<AppState>) -> String {
    format!("{}\n", state.admission.depth())
}

/// The preferred client-side block size for resumable uploads.
pub async fn block_size() -> String {
    format!("{{\"blocksize\":{}}}", MAX_CHUNK_SIZE * AIO_CONCURRENT)
}

pub async fn store_status(State(state): State<AppState>) -> Result<String, ApiError> {
    state.store.status().await.map_err(|err| {
        tracing::warn!("store status probe failed: {err}");
        ApiError::StoreDown
    })
}

pub async fn info(
    State(state): State<AppState>,
    Path((pool, oid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if !is_valid_pool_name(&pool) {
        return Err(ApiError::NotFound);
    }
    let pool_handle = state.store.open_pool(&pool).await?;
    let striper = pool_handle.create_striper().await?;
    let object_state = striper.state(&oid).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        format!("{{\"size\":{}}}", object_state.size),
    )
        .into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Path((pool, oid)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if !is_valid_pool_name(&pool) {
        return Err(ApiError::NotFound);
    }
    let pool_handle = state.store.open_pool(&pool).await?;
    let striper = pool_handle.create_striper().await?;
    striper.remove(&oid).await?;
    Ok(StatusCode::OK)
}
