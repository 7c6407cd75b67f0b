use dashmap::{DashMap, iter::IterMut, mapref::one::RefMut};
use tracing::debug;

use crate::{
    common::PlayerId,
    player::{Player, PlayerEnv, PlayerMode, PlayerSnapshot},
};

/// Sessions of one hub, keyed by player id. Entries are created on first
/// reference and live as long as the hub.
pub struct Registry {
    players: DashMap<PlayerId, Player>,
    env: PlayerEnv,
}

impl Registry {
    pub fn new(env: PlayerEnv) -> Self {
        Self {
            players: DashMap::new(),
            env,
        }
    }

    /// Returns the session for `id`, creating it with `mode` if unseen. The
    /// mode of an existing session is never changed.
    pub fn resolve(&self, id: &PlayerId, mode: PlayerMode) -> RefMut<'_, PlayerId, Player> {
        self.players.entry(id.clone()).or_insert_with(|| {
            debug!("creating {} session {}", mode.as_str(), id);
            Player::new(id.clone(), mode, &self.env)
        })
    }

    pub fn get_mut(&self, id: &PlayerId) -> Option<RefMut<'_, PlayerId, Player>> {
        self.players.get_mut(id)
    }

    pub fn iter_mut(&self) -> IterMut<'_, PlayerId, Player> {
        self.players.iter_mut()
    }

    pub fn any_actually_playing(&self) -> bool {
        self.players.iter().any(|p| p.is_actually_playing())
    }

    pub fn playing_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.is_actually_playing())
            .count()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        let mut players: Vec<_> = self.players.iter().map(|p| p.snapshot()).collect();
        players.sort_by(|a, b| a.player_id.0.cmp(&b.player_id.0));
        players
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedFactory, player_env};

    #[test]
    fn resolve_creates_once_and_keeps_mode() {
        let (env, _rx) = player_env(ScriptedFactory::new());
        let registry = Registry::new(env);
        let id = PlayerId::from("a");

        assert_eq!(
            registry.resolve(&id, PlayerMode::LowLatency).mode(),
            PlayerMode::LowLatency
        );
        assert_eq!(
            registry.resolve(&id, PlayerMode::MediaPlayer).mode(),
            PlayerMode::LowLatency
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id));
        assert!(!registry.any_actually_playing());
    }

    #[test]
    fn snapshots_are_sorted_by_id() {
        let (env, _rx) = player_env(ScriptedFactory::new());
        let registry = Registry::new(env);
        registry.resolve(&PlayerId::from("b"), PlayerMode::MediaPlayer);
        registry.resolve(&PlayerId::from("a"), PlayerMode::LowLatency);

        let ids: Vec<_> = registry
            .snapshots()
            .into_iter()
            .map(|s| s.player_id.0)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
