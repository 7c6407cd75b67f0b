//! Playback sessions.
//!
//! A [`Player`] is one session keyed by a caller-chosen id. Its variant is
//! chosen when the session is created and never changes: [`MediaPlayer`]
//! drives a streaming [`MediaEngine`](crate::engine::MediaEngine), while
//! [`PoolPlayer`] fires sounds on the shared low-latency
//! [`SoundPool`](crate::engine::SoundPool).

pub mod media;
pub mod pool;
pub mod state;

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use serde::Serialize;

pub use media::MediaPlayer;
pub use pool::PoolPlayer;
pub use state::PlayerSnapshot;

use crate::{
    common::{CommandError, EngineError, PlayerId},
    engine::{EngineEvent, EngineEvents, EngineFactory, Notice, PlayingRoute, Source},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerMode {
    #[serde(rename = "PlayerMode.MEDIA_PLAYER")]
    MediaPlayer,
    #[serde(rename = "PlayerMode.LOW_LATENCY")]
    LowLatency,
}

impl PlayerMode {
    /// Accepts `PlayerMode.LOW_LATENCY` as well as the bare `LOW_LATENCY`.
    pub fn parse(name: &str) -> Result<Self, CommandError> {
        let bare = name.strip_prefix("PlayerMode.").unwrap_or(name);
        match bare.to_ascii_uppercase().as_str() {
            "MEDIA_PLAYER" => Ok(Self::MediaPlayer),
            "LOW_LATENCY" => Ok(Self::LowLatency),
            _ => Err(CommandError::UnknownMode(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MediaPlayer => "MEDIA_PLAYER",
            Self::LowLatency => "LOW_LATENCY",
        }
    }
}

/// What happens to a session when its source plays to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseMode {
    /// Tear the engine down.
    #[default]
    Release,
    /// Restart from zero without reporting completion.
    Loop,
    /// Hold at the end; the next play starts over.
    Stop,
}

impl ReleaseMode {
    pub fn parse(name: &str) -> Result<Self, CommandError> {
        let bare = name.strip_prefix("ReleaseMode.").unwrap_or(name);
        match bare.to_ascii_uppercase().as_str() {
            "RELEASE" => Ok(Self::Release),
            "LOOP" => Ok(Self::Loop),
            "STOP" => Ok(Self::Stop),
            _ => Err(CommandError::UnknownReleaseMode(name.to_string())),
        }
    }
}

/// Output focus change delivered by the focus service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

impl FocusChange {
    pub const GAIN: i32 = 1;
    pub const LOSS: i32 = -1;
    pub const LOSS_TRANSIENT: i32 = -2;
    pub const LOSS_TRANSIENT_CAN_DUCK: i32 = -3;

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::GAIN => Some(Self::Gain),
            Self::LOSS => Some(Self::Loss),
            Self::LOSS_TRANSIENT => Some(Self::LossTransient),
            Self::LOSS_TRANSIENT_CAN_DUCK => Some(Self::LossTransientCanDuck),
            _ => None,
        }
    }
}

/// What a session needs from its hub to build engines and report back.
#[derive(Clone)]
pub struct PlayerEnv {
    pub factory: Arc<dyn EngineFactory>,
    pub notices: flume::Sender<Notice>,
    /// Volume multiplier applied while another holder has focus.
    pub duck_volume: f64,
}

impl PlayerEnv {
    pub fn events(&self, player_id: &PlayerId) -> EngineEvents {
        EngineEvents::new(player_id.clone(), self.notices.clone())
    }
}

/// Follow-up work a session asks its hub to perform after an engine callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerSignal {
    Duration(i64),
    /// Playback actually started; the poller must be running.
    IsPlaying,
    Completed,
    Error(String),
}

/// Operations shared by both session variants.
pub trait Playback: Send + Sync {
    fn player_id(&self) -> &PlayerId;
    fn mode(&self) -> PlayerMode;

    fn config_attributes(
        &mut self,
        respect_silence: bool,
        stay_awake: bool,
    ) -> Result<(), EngineError>;
    fn set_volume(&mut self, volume: f64) -> Result<(), EngineError>;
    fn set_url(&mut self, source: Source) -> Result<(), EngineError>;
    fn seek(&mut self, position_ms: i64) -> Result<(), EngineError>;
    fn play(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    fn release(&mut self);
    fn set_rate(&mut self, rate: f64) -> Result<bool, EngineError>;
    fn duration(&self) -> Result<i64, EngineError>;
    fn current_position(&self) -> Result<i64, EngineError>;
    fn set_release_mode(&mut self, mode: ReleaseMode) -> Result<(), EngineError>;
    fn set_playing_route(&mut self, route: PlayingRoute) -> Result<(), EngineError>;

    /// Playing and producing progress the poller can report.
    fn is_actually_playing(&self) -> bool;
    /// Returns and clears the pending seek-completion flag.
    fn take_seek_finished(&mut self) -> bool;

    fn on_engine_event(&mut self, event: EngineEvent) -> Vec<PlayerSignal>;
    fn on_focus_change(&mut self, change: FocusChange) -> Vec<PlayerSignal>;

    fn snapshot(&self) -> PlayerSnapshot;
}

pub enum Player {
    Media(MediaPlayer),
    LowLatency(PoolPlayer),
}

impl Player {
    pub fn new(player_id: PlayerId, mode: PlayerMode, env: &PlayerEnv) -> Self {
        match mode {
            PlayerMode::MediaPlayer => Self::Media(MediaPlayer::new(player_id, env.clone())),
            PlayerMode::LowLatency => Self::LowLatency(PoolPlayer::new(player_id, env)),
        }
    }
}

impl Deref for Player {
    type Target = dyn Playback;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Media(p) => p,
            Self::LowLatency(p) => p,
        }
    }
}

impl DerefMut for Player {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Media(p) => p,
            Self::LowLatency(p) => p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_names() {
        assert_eq!(
            PlayerMode::parse("PlayerMode.LOW_LATENCY").unwrap(),
            PlayerMode::LowLatency
        );
        assert_eq!(
            PlayerMode::parse("media_player").unwrap(),
            PlayerMode::MediaPlayer
        );
        assert!(matches!(
            PlayerMode::parse("PlayerMode.VINYL"),
            Err(CommandError::UnknownMode(name)) if name == "PlayerMode.VINYL"
        ));
    }

    #[test]
    fn parses_release_modes() {
        assert_eq!(ReleaseMode::parse("ReleaseMode.LOOP").unwrap(), ReleaseMode::Loop);
        assert_eq!(ReleaseMode::parse("STOP").unwrap(), ReleaseMode::Stop);
        assert!(ReleaseMode::parse("ReleaseMode.NEVER").is_err());
    }

    #[test]
    fn focus_codes() {
        assert_eq!(FocusChange::from_code(-3), Some(FocusChange::LossTransientCanDuck));
        assert_eq!(FocusChange::from_code(1), Some(FocusChange::Gain));
        assert_eq!(FocusChange::from_code(2), None);
    }

    #[test]
    fn mode_serializes_with_wire_name() {
        assert_eq!(
            serde_json::to_value(PlayerMode::LowLatency).unwrap(),
            "PlayerMode.LOW_LATENCY"
        );
        assert_eq!(serde_json::to_value(ReleaseMode::Stop).unwrap(), "STOP");
    }
}
