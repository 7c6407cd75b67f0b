use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    common::{ConnectionId, ErrorResponse},
    player::state::Players,
    server::AppState,
};

/// GET /v1/connections/{connection_id}/players
pub async fn get_players(
    Path(connection_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let connection_id = ConnectionId::from(connection_id);
    tracing::debug!("GET /v1/connections/{}/players", connection_id);
    match state.hubs.get(&connection_id) {
        Some(hub) => (
            StatusCode::OK,
            Json(Players {
                players: hub.snapshots(),
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(
                format!("Connection not found: {}", connection_id),
                format!("/v1/connections/{}/players", connection_id),
            )),
        )
            .into_response(),
    }
}
