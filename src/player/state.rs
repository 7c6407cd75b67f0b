use serde::Serialize;

use super::{PlayerMode, ReleaseMode};
use crate::{common::PlayerId, engine::PlayingRoute};

/// Read-only view of one session, as returned by the inspection routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub mode: PlayerMode,
    pub url: Option<String>,
    pub is_local: bool,
    pub volume: f64,
    pub rate: f64,
    pub release_mode: ReleaseMode,
    pub route: PlayingRoute,
    pub playing: bool,
    pub prepared: bool,
    pub released: bool,
}

#[derive(Debug, Serialize)]
pub struct Players {
    pub players: Vec<PlayerSnapshot>,
}
