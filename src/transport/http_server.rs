use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::{connections, stats},
        websocket_server::websocket_handler,
    },
};

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/websocket", get(websocket_handler))
        .route("/info", get(stats::get_info))
        .route("/stats", get(stats::get_stats))
        .route(
            "/connections/{connection_id}/players",
            get(connections::get_players),
        );

    Router::new()
        .nest(API_V1, v1_routes)
        .route("/version", get(stats::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth))
        .layer(middleware::from_fn(add_response_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
