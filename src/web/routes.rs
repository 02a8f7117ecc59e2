use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::ws::ws_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_path = state.config.get().web.ws_path.clone();

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/codecs", get(handlers::list_codecs))
        .route("/sources", get(handlers::list_sources))
        .route("/clients", get(handlers::list_clients))
        .route("/clients/:id", get(handlers::get_client))
        .route("/config", get(handlers::get_config));

    Router::new()
        .route(&ws_path, any(ws_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
