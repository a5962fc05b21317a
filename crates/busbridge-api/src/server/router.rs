//! Router construction.

use axum::{routing::any, routing::get, Router};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use super::types::{ServerState, MAX_REQUEST_BODY_SIZE};
use crate::handlers::{
    get_object_handler, health_handler, list_objects_handler, object_request_handler,
};

pub fn create_router_with_state(state: ServerState) -> Router {
    let api_routes = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/objects", get(list_objects_handler))
        .route("/api/objects/:id", get(get_object_handler))
        .route("/api/objects/:id/*path", any(object_request_handler));

    api_routes
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
