//! Playback engine capability set.
//!
//! The host never decodes audio itself. Each session drives an engine through
//! one of two traits: [`MediaEngine`] for the full-featured streaming variant,
//! and [`SoundPool`] for the low-latency variant, where one pool is shared by
//! every low-latency session. Engines report asynchronous milestones through
//! [`EngineEvents`].

pub mod headless;
pub mod probe;

use std::{path::PathBuf, sync::Arc};

pub use headless::HeadlessBackend;

use crate::common::{EngineError, PlayerId};

/// Where a session's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Remote(String),
}

impl Source {
    pub fn new(url: &str, is_local: bool) -> Self {
        if is_local {
            Self::Local(PathBuf::from(url.strip_prefix("file://").unwrap_or(url)))
        } else {
            Self::Remote(url.to_string())
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// The reference as the caller supplied it.
    pub fn url(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote(url) => url.clone(),
        }
    }

    /// File extension, used as a container hint when probing.
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            Self::Local(path) => path.clone(),
            Self::Remote(url) => {
                PathBuf::from(url.split(['?', '#']).next().unwrap_or(url.as_str()))
            }
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Output device a session renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayingRoute {
    #[default]
    Speakers,
    Earpiece,
}

impl PlayingRoute {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "speakers" | "speaker" => Some(Self::Speakers),
            "earpiece" => Some(Self::Earpiece),
            _ => None,
        }
    }
}

/// Output configuration applied to a streaming engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutputAttributes {
    /// Stay silent when the device is in silent mode.
    pub respect_silence: bool,
    /// Hold a wake lock while playing.
    pub stay_awake: bool,
    pub route: PlayingRoute,
}

/// Asynchronous milestone reported by an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Source is ready; duration is known.
    Prepared,
    /// Playback reached the end of a non-looping source.
    Completed,
    SeekCompleted,
    /// A pool sound finished loading.
    Loaded,
    Error(String),
}

/// An [`EngineEvent`] tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub player_id: PlayerId,
    pub event: EngineEvent,
}

/// Callback handle given to engines. Delivery is fire-and-forget: a closed
/// channel means the owning hub is gone.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    player_id: PlayerId,
    tx: flume::Sender<Notice>,
}

impl EngineEvents {
    pub fn new(player_id: PlayerId, tx: flume::Sender<Notice>) -> Self {
        Self { player_id, tx }
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(Notice {
            player_id: self.player_id.clone(),
            event,
        });
    }
}

/// Streaming engine. Mirrors the lifecycle of a platform media player:
/// `set_source` → `prepare_async` (→ `Prepared`) → `start`/`pause`/`seek_to`.
pub trait MediaEngine: Send + Sync {
    fn set_source(&mut self, source: &Source) -> Result<(), EngineError>;
    /// Begins loading; completion is reported as [`EngineEvent::Prepared`].
    fn prepare_async(&mut self) -> Result<(), EngineError>;
    fn start(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    /// Returns to the idle state, dropping the source.
    fn reset(&mut self);
    fn release(&mut self);
    /// Completion is reported as [`EngineEvent::SeekCompleted`].
    fn seek_to(&mut self, position_ms: i64) -> Result<(), EngineError>;
    fn set_volume(&mut self, volume: f64);
    fn set_looping(&mut self, looping: bool);
    /// Returns whether the engine accepted the rate.
    fn set_rate(&mut self, rate: f64) -> Result<bool, EngineError>;
    fn set_attributes(&mut self, attributes: OutputAttributes);
    fn duration(&self) -> Result<i64, EngineError>;
    fn current_position(&self) -> Result<i64, EngineError>;
}

pub type SoundId = u32;
pub type StreamId = u32;

/// Low-latency engine: sounds are loaded once, then fired as streams.
pub trait SoundPool: Send + Sync {
    /// Begins loading; completion is reported to `events` as
    /// [`EngineEvent::Loaded`].
    fn load(&self, source: &Source, events: EngineEvents) -> Result<SoundId, EngineError>;
    fn unload(&self, sound: SoundId);
    fn play(
        &self,
        sound: SoundId,
        volume: f64,
        looping: bool,
        rate: f64,
    ) -> Result<StreamId, EngineError>;
    fn pause(&self, stream: StreamId);
    fn resume(&self, stream: StreamId);
    fn stop(&self, stream: StreamId);
    fn set_volume(&self, stream: StreamId, volume: f64);
    fn set_rate(&self, stream: StreamId, rate: f64);
    fn set_loop(&self, stream: StreamId, looping: bool);
}

/// Builds engines for new sessions.
pub trait EngineFactory: Send + Sync {
    /// Backend name reported by `/v1/info`.
    fn name(&self) -> &'static str;
    fn media_engine(&self, events: EngineEvents) -> Box<dyn MediaEngine>;
    /// The pool shared by every low-latency session.
    fn sound_pool(&self) -> Arc<dyn SoundPool>;
}
