use tracing::{debug, warn};

use super::{
    FocusChange, PlayerEnv, PlayerMode, PlayerSignal, PlayerSnapshot, Playback, ReleaseMode,
};
use crate::{
    common::{EngineError, PlayerId},
    engine::{EngineEvent, MediaEngine, OutputAttributes, PlayingRoute, Source},
};

/// Streaming session. The engine is created lazily and recreated after a
/// release, so a released session comes back on the next `play` or `set_url`.
pub struct MediaPlayer {
    id: PlayerId,
    env: PlayerEnv,
    engine: Option<Box<dyn MediaEngine>>,
    source: Option<Source>,
    volume: f64,
    rate: f64,
    release_mode: ReleaseMode,
    attributes: OutputAttributes,

    released: bool,
    prepared: bool,
    playing: bool,
    /// Seek requested before the engine was prepared.
    should_seek_to: Option<i64>,
    seek_finished: bool,
    /// The next seek completion comes from `stop` rewinding, not the caller.
    internal_seek: bool,
    ducked: bool,
    resume_on_gain: bool,
}

impl MediaPlayer {
    pub fn new(id: PlayerId, env: PlayerEnv) -> Self {
        Self {
            id,
            env,
            engine: None,
            source: None,
            volume: 1.0,
            rate: 1.0,
            release_mode: ReleaseMode::default(),
            attributes: OutputAttributes::default(),
            released: true,
            prepared: false,
            playing: false,
            should_seek_to: None,
            seek_finished: false,
            internal_seek: false,
            ducked: false,
            resume_on_gain: false,
        }
    }

    fn effective_volume(&self) -> f64 {
        if self.ducked {
            self.volume * self.env.duck_volume
        } else {
            self.volume
        }
    }

    fn engine(&mut self) -> Result<&mut Box<dyn MediaEngine>, EngineError> {
        self.engine.as_mut().ok_or(EngineError::Released)
    }

    fn engine_ref(&self) -> Result<&dyn MediaEngine, EngineError> {
        self.engine.as_deref().ok_or(EngineError::Released)
    }

    /// Builds a fresh engine carrying the session's current settings.
    fn create_engine(&mut self) -> &mut Box<dyn MediaEngine> {
        let mut engine = self.env.factory.media_engine(self.env.events(&self.id));
        engine.set_attributes(self.attributes);
        engine.set_volume(self.effective_volume());
        engine.set_looping(self.release_mode == ReleaseMode::Loop);
        self.released = false;
        self.prepared = false;
        self.engine.insert(engine)
    }

    fn start_engine(&mut self) -> Result<(), EngineError> {
        self.engine()?.start()
    }

    fn on_prepared(&mut self) -> Vec<PlayerSignal> {
        self.prepared = true;
        let rate = self.rate;
        let mut signals = Vec::new();

        let Ok(engine) = self.engine() else {
            return signals;
        };
        if rate != 1.0 {
            let _ = engine.set_rate(rate);
        }
        signals.push(PlayerSignal::Duration(engine.duration().unwrap_or(-1)));

        if self.playing {
            match self.start_engine() {
                Ok(()) => signals.push(PlayerSignal::IsPlaying),
                Err(e) => signals.push(PlayerSignal::Error(e.to_string())),
            }
        }
        if let Some(position) = self.should_seek_to.take() {
            if let Err(e) = self.engine().and_then(|engine| engine.seek_to(position)) {
                warn!("[{}] deferred seek failed: {}", self.id, e);
            }
        }
        signals
    }

    fn on_completed(&mut self) -> Vec<PlayerSignal> {
        match self.release_mode {
            ReleaseMode::Loop => {
                // Engines that do not loop natively still land here.
                let restarted = self
                    .engine()
                    .and_then(|engine| engine.seek_to(0).and_then(|_| engine.start()));
                self.internal_seek = true;
                match restarted {
                    Ok(()) => vec![],
                    Err(e) => vec![PlayerSignal::Error(e.to_string())],
                }
            }
            ReleaseMode::Stop => {
                self.playing = false;
                vec![PlayerSignal::Completed]
            }
            ReleaseMode::Release => {
                self.release();
                vec![PlayerSignal::Completed]
            }
        }
    }

    fn apply_volume(&mut self) {
        let volume = self.effective_volume();
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.set_volume(volume);
        }
    }

    fn apply_attributes(&mut self) {
        let attributes = self.attributes;
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.set_attributes(attributes);
        }
    }
}

impl Playback for MediaPlayer {
    fn player_id(&self) -> &PlayerId {
        &self.id
    }

    fn mode(&self) -> PlayerMode {
        PlayerMode::MediaPlayer
    }

    fn config_attributes(
        &mut self,
        respect_silence: bool,
        stay_awake: bool,
    ) -> Result<(), EngineError> {
        self.attributes.respect_silence = respect_silence;
        self.attributes.stay_awake = stay_awake;
        self.apply_attributes();
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), EngineError> {
        self.volume = volume.clamp(0.0, 1.0);
        self.apply_volume();
        Ok(())
    }

    fn set_url(&mut self, source: Source) -> Result<(), EngineError> {
        if self.source.as_ref() == Some(&source) {
            return Ok(());
        }
        debug!("[{}] source -> {}", self.id, source.url());
        self.source = Some(source.clone());

        if self.released || self.engine.is_none() {
            self.create_engine();
        } else {
            self.engine()?.reset();
        }
        self.prepared = false;

        let volume = self.effective_volume();
        let looping = self.release_mode == ReleaseMode::Loop;
        let engine = self.engine()?;
        engine.set_source(&source)?;
        engine.set_volume(volume);
        engine.set_looping(looping);
        engine.prepare_async()
    }

    fn seek(&mut self, position_ms: i64) -> Result<(), EngineError> {
        if self.prepared {
            self.internal_seek = false;
            self.engine()?.seek_to(position_ms)
        } else {
            self.should_seek_to = Some(position_ms);
            Ok(())
        }
    }

    fn play(&mut self) -> Result<(), EngineError> {
        if self.playing {
            return Ok(());
        }
        if self.released || self.engine.is_none() {
            let source = self.source.clone().ok_or(EngineError::NoSource)?;
            let engine = self.create_engine();
            engine.set_source(&source)?;
            engine.prepare_async()?;
        } else if self.prepared {
            self.start_engine()?;
        }
        self.playing = true;
        self.resume_on_gain = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.resume_on_gain = false;
        if self.playing {
            self.playing = false;
            if self.prepared {
                self.engine()?.pause()?;
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        if self.released {
            return Ok(());
        }
        if self.release_mode == ReleaseMode::Release {
            self.release();
            return Ok(());
        }
        if self.playing {
            self.playing = false;
            if self.prepared {
                let engine = self.engine()?;
                engine.pause()?;
                engine.seek_to(0)?;
                self.internal_seek = true;
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        if let Some(mut engine) = self.engine.take() {
            if self.playing {
                let _ = engine.stop();
            }
            engine.reset();
            engine.release();
        }
        self.prepared = false;
        self.released = true;
        self.playing = false;
        self.should_seek_to = None;
        self.seek_finished = false;
        self.internal_seek = false;
        self.resume_on_gain = false;
    }

    fn set_rate(&mut self, rate: f64) -> Result<bool, EngineError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Ok(false);
        }
        let Some(engine) = self.engine.as_deref_mut() else {
            self.rate = rate;
            return Ok(false);
        };
        let accepted = engine.set_rate(rate)?;
        if accepted {
            self.rate = rate;
        }
        Ok(accepted)
    }

    fn duration(&self) -> Result<i64, EngineError> {
        self.engine_ref()?.duration()
    }

    fn current_position(&self) -> Result<i64, EngineError> {
        self.engine_ref()?.current_position()
    }

    fn set_release_mode(&mut self, mode: ReleaseMode) -> Result<(), EngineError> {
        self.release_mode = mode;
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.set_looping(mode == ReleaseMode::Loop);
        }
        Ok(())
    }

    fn set_playing_route(&mut self, route: PlayingRoute) -> Result<(), EngineError> {
        self.attributes.route = route;
        self.apply_attributes();
        Ok(())
    }

    fn is_actually_playing(&self) -> bool {
        self.playing && self.prepared
    }

    fn take_seek_finished(&mut self) -> bool {
        std::mem::take(&mut self.seek_finished)
    }

    fn on_engine_event(&mut self, event: EngineEvent) -> Vec<PlayerSignal> {
        if self.engine.is_none() {
            return vec![];
        }
        match event {
            EngineEvent::Prepared => self.on_prepared(),
            EngineEvent::Completed => self.on_completed(),
            EngineEvent::SeekCompleted => {
                if std::mem::take(&mut self.internal_seek) {
                    debug!("[{}] rewind complete", self.id);
                } else {
                    self.seek_finished = true;
                }
                vec![]
            }
            EngineEvent::Loaded => vec![],
            EngineEvent::Error(message) => {
                // Drop the broken engine; the next play builds a new one.
                self.release();
                vec![PlayerSignal::Error(message)]
            }
        }
    }

    fn on_focus_change(&mut self, change: FocusChange) -> Vec<PlayerSignal> {
        let result = match change {
            FocusChange::Loss => self.pause(),
            FocusChange::LossTransient => {
                let was_playing = self.playing;
                let paused = self.pause();
                self.resume_on_gain = was_playing;
                paused
            }
            FocusChange::LossTransientCanDuck => {
                self.ducked = true;
                self.apply_volume();
                Ok(())
            }
            FocusChange::Gain => {
                if std::mem::take(&mut self.ducked) {
                    self.apply_volume();
                }
                if std::mem::take(&mut self.resume_on_gain) {
                    self.play()
                } else {
                    Ok(())
                }
            }
        };

        match result {
            Err(e) => {
                warn!("[{}] focus change {:?} failed: {}", self.id, change, e);
                vec![PlayerSignal::Error(e.to_string())]
            }
            Ok(()) if change == FocusChange::Gain && self.is_actually_playing() => {
                vec![PlayerSignal::IsPlaying]
            }
            Ok(()) => vec![],
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.id.clone(),
            mode: PlayerMode::MediaPlayer,
            url: self.source.as_ref().map(Source::url),
            is_local: self.source.as_ref().is_some_and(Source::is_local),
            volume: self.volume,
            rate: self.rate,
            release_mode: self.release_mode,
            route: self.attributes.route,
            playing: self.playing,
            prepared: self.prepared,
            released: self.released,
        }
    }
}
