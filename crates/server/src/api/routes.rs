use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware as mw, threads, torznab};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Torznab endpoint: rejections come back as Torznab error documents
    let torznab_routes = Router::new()
        .route("/api", get(torznab::torznab_api))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            mw::torznab_auth_middleware,
        ));

    // JSON API
    let api_routes = Router::new()
        .route("/config", get(handlers::get_config))
        .route("/threads/{id}/releases", get(threads::thread_releases))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            mw::auth_middleware,
        ));

    // Open endpoints
    let open_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics));

    Router::new()
        .merge(torznab_routes)
        .nest("/api/v1", api_routes)
        .merge(open_routes)
        .layer(middleware::from_fn(mw::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
