use std::sync::Arc;

use axum::{extract::State, response::Json};

use crate::{
    player::PlayerMode,
    protocol::{GitInfo, Info, Stats, Version},
    server::AppState,
};

/// GET /v1/info
pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<Info> {
    tracing::debug!("GET /v1/info");
    let version_str = env!("CARGO_PKG_VERSION");
    let (core, pre_release) = match version_str.split_once('-') {
        Some((core, pre)) => (core, Some(pre.to_string())),
        None => (version_str, None),
    };
    let mut parts = core.split('.');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch = parts
        .next()
        .and_then(|s| s.split('+').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Json(Info {
        version: Version {
            semver: version_str.to_string(),
            major,
            minor,
            patch,
            pre_release,
        },
        build_time: option_env!("BUILD_TIME")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        git: GitInfo {
            branch: option_env!("GIT_BRANCH").unwrap_or("unknown").to_string(),
            commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            commit_time: option_env!("GIT_COMMIT_TIME")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        },
        backend: state.engines.name().to_string(),
        player_modes: vec![
            PlayerMode::MediaPlayer.as_str(),
            PlayerMode::LowLatency.as_str(),
        ],
    })
}

/// GET /v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    tracing::debug!("GET /v1/stats");
    Json(collect_stats(&state))
}

/// GET /version
pub async fn get_version() -> String {
    tracing::debug!("GET /version");
    env!("CARGO_PKG_VERSION").to_string()
}

pub fn collect_stats(state: &AppState) -> Stats {
    let (players, playing_players) = state
        .hubs
        .iter()
        .fold((0, 0), |(players, playing), hub| {
            (players + hub.player_count(), playing + hub.playing_count())
        });

    Stats {
        connections: state.hubs.len(),
        players,
        playing_players,
        uptime: state.uptime_ms(),
    }
}
