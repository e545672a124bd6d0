use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{digest, download, meta, upload};
use crate::middleware::{access_log, admission_middleware, auth_middleware};
use crate::AppState;

/// Build the gateway router.
///
/// Object routes sit behind the admission queue; the signature check and
/// the access log wrap everything. Identity and stats endpoints bypass
/// admission so they stay responsive when the queue is saturated.
pub fn router(state: AppState) -> Router {
    let object_routes = Router::new()
        .route("/info/{pool}/{soid}", get(meta::info))
        .route("/calcmd5/{pool}/{soid}", get(digest::handle))
        .route(
            "/{pool}/{soid}",
            get(download::handle)
                .put(upload::handle)
                .delete(meta::delete),
        )
        .layer(from_fn_with_state(state.clone(), admission_middleware));

    Router::new()
        .route("/whoareyou", get(meta::whoareyou))
        .route("/cachestats", get(meta::cache_stats))
        .route("/threads", get(meta::threads))
        .route("/blocksize", get(meta::block_size))
        .route("/cephstatus", get(meta::store_status))
        .merge(object_routes)
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn(access_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
