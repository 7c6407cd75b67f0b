use std::sync::Arc;

use tracing::debug;

use super::{
    FocusChange, PlayerEnv, PlayerMode, PlayerSignal, PlayerSnapshot, Playback, ReleaseMode,
};
use crate::{
    common::{EngineError, PlayerId},
    engine::{EngineEvent, EngineEvents, PlayingRoute, SoundId, SoundPool, Source, StreamId},
};

const MODE: &str = "LOW_LATENCY";

/// Low-latency session backed by the shared sound pool. The pool reports no
/// progress, so these sessions never count as actually playing.
pub struct PoolPlayer {
    id: PlayerId,
    events: EngineEvents,
    pool: Arc<dyn SoundPool>,
    source: Option<Source>,
    sound: Option<SoundId>,
    stream: Option<StreamId>,
    volume: f64,
    rate: f64,
    looping: bool,
    playing: bool,
    paused: bool,
    loading: bool,
}

impl PoolPlayer {
    pub fn new(id: PlayerId, env: &PlayerEnv) -> Self {
        Self {
            events: env.events(&id),
            pool: env.factory.sound_pool(),
            id,
            source: None,
            sound: None,
            stream: None,
            volume: 1.0,
            rate: 1.0,
            looping: false,
            playing: false,
            paused: false,
            loading: false,
        }
    }

    fn start(&mut self) -> Result<(), EngineError> {
        match (self.paused, self.stream) {
            (true, Some(stream)) => {
                self.pool.set_rate(stream, self.rate);
                self.pool.resume(stream);
                self.paused = false;
            }
            _ => {
                let sound = self.sound.ok_or(EngineError::NoSource)?;
                // One live stream per session.
                if let Some(previous) = self.stream.take() {
                    self.pool.stop(previous);
                }
                self.stream = Some(self.pool.play(sound, self.volume, self.looping, self.rate)?);
                self.paused = false;
            }
        }
        Ok(())
    }

    fn unsupported(operation: &'static str) -> EngineError {
        EngineError::Unsupported {
            mode: MODE,
            operation,
        }
    }
}

impl Playback for PoolPlayer {
    fn player_id(&self) -> &PlayerId {
        &self.id
    }

    fn mode(&self) -> PlayerMode {
        PlayerMode::LowLatency
    }

    fn config_attributes(&mut self, _: bool, _: bool) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), EngineError> {
        self.volume = volume.clamp(0.0, 1.0);
        if let (true, Some(stream)) = (self.playing, self.stream) {
            self.pool.set_volume(stream, self.volume);
        }
        Ok(())
    }

    fn set_url(&mut self, source: Source) -> Result<(), EngineError> {
        if self.source.as_ref() == Some(&source) {
            return Ok(());
        }
        if self.sound.is_some() {
            self.release();
        }
        debug!("[{}] loading {}", self.id, source.url());
        self.loading = true;
        let sound = self.pool.load(&source, self.events.clone());
        self.source = Some(source);
        match sound {
            Ok(sound) => {
                self.sound = Some(sound);
                Ok(())
            }
            Err(e) => {
                self.loading = false;
                Err(e)
            }
        }
    }

    fn seek(&mut self, _: i64) -> Result<(), EngineError> {
        Err(Self::unsupported("seek"))
    }

    fn play(&mut self) -> Result<(), EngineError> {
        if self.sound.is_none() {
            return Err(EngineError::NoSource);
        }
        if !self.loading {
            self.start()?;
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        if let (true, Some(stream)) = (self.playing, self.stream) {
            self.pool.pause(stream);
        }
        self.playing = false;
        self.paused = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        if self.playing {
            if let Some(stream) = self.stream.take() {
                self.pool.stop(stream);
            }
            self.playing = false;
        }
        self.paused = false;
        Ok(())
    }

    /// Unloads the sound and forgets the source, so the next `set_url` with
    /// the same url loads it again.
    fn release(&mut self) {
        let _ = self.stop();
        if let Some(stream) = self.stream.take() {
            self.pool.stop(stream);
        }
        if let Some(sound) = self.sound.take() {
            self.pool.unload(sound);
        }
        self.source = None;
        self.loading = false;
    }

    fn set_rate(&mut self, rate: f64) -> Result<bool, EngineError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Ok(false);
        }
        self.rate = rate;
        if let Some(stream) = self.stream {
            self.pool.set_rate(stream, rate);
        }
        Ok(true)
    }

    fn duration(&self) -> Result<i64, EngineError> {
        Err(Self::unsupported("getDuration"))
    }

    fn current_position(&self) -> Result<i64, EngineError> {
        Err(Self::unsupported("getCurrentPosition"))
    }

    fn set_release_mode(&mut self, mode: ReleaseMode) -> Result<(), EngineError> {
        self.looping = mode == ReleaseMode::Loop;
        if let (true, Some(stream)) = (self.playing, self.stream) {
            self.pool.set_loop(stream, self.looping);
        }
        Ok(())
    }

    fn set_playing_route(&mut self, _: PlayingRoute) -> Result<(), EngineError> {
        Err(Self::unsupported("earpieceOrSpeakersToggle"))
    }

    fn is_actually_playing(&self) -> bool {
        false
    }

    fn take_seek_finished(&mut self) -> bool {
        false
    }

    fn on_engine_event(&mut self, event: EngineEvent) -> Vec<PlayerSignal> {
        match event {
            EngineEvent::Loaded if self.loading => {
                self.loading = false;
                if self.playing {
                    if let Err(e) = self.start() {
                        return vec![PlayerSignal::Error(e.to_string())];
                    }
                }
                vec![]
            }
            EngineEvent::Error(message) => {
                self.loading = false;
                self.playing = false;
                self.sound = None;
                self.stream = None;
                self.source = None;
                vec![PlayerSignal::Error(message)]
            }
            _ => vec![],
        }
    }

    fn on_focus_change(&mut self, _: FocusChange) -> Vec<PlayerSignal> {
        vec![]
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.id.clone(),
            mode: PlayerMode::LowLatency,
            url: self.source.as_ref().map(Source::url),
            is_local: self.source.as_ref().is_some_and(Source::is_local),
            volume: self.volume,
            rate: self.rate,
            release_mode: if self.looping {
                ReleaseMode::Loop
            } else {
                ReleaseMode::Release
            },
            route: PlayingRoute::default(),
            playing: self.playing,
            prepared: self.sound.is_some() && !self.loading,
            released: self.sound.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedFactory, player_env};

    fn player() -> (PoolPlayer, Arc<ScriptedFactory>) {
        let factory = ScriptedFactory::new();
        let (env, _rx) = player_env(factory.clone());
        (PoolPlayer::new(PlayerId::from("p"), &env), factory)
    }

    #[test]
    fn play_while_loading_waits_for_load() {
        let (mut player, factory) = player();
        player.set_url(Source::new("/beep.wav", true)).unwrap();
        player.play().unwrap();
        assert!(!factory.pool.called("play:1"));

        player.on_engine_event(EngineEvent::Loaded);
        assert!(factory.pool.called("play:1"));
        assert!(!player.is_actually_playing());
    }

    #[test]
    fn pause_then_play_resumes_stream() {
        let (mut player, factory) = player();
        player.set_url(Source::new("/beep.wav", true)).unwrap();
        player.on_engine_event(EngineEvent::Loaded);
        player.play().unwrap();
        player.pause().unwrap();
        player.play().unwrap();
        assert!(factory.pool.called("pause:2"));
        assert!(factory.pool.called("resume:2"));
        assert_eq!(factory.pool.count("play:1"), 1);
    }

    #[test]
    fn progress_queries_are_unsupported() {
        let (mut player, _) = player();
        let err = player.duration().unwrap_err();
        assert_eq!(
            err.to_string(),
            "LOW_LATENCY mode does not support: getDuration"
        );
        assert!(player.current_position().is_err());
        assert!(player.seek(10).is_err());
        assert!(player.set_playing_route(PlayingRoute::Earpiece).is_err());
    }

    #[test]
    fn new_url_unloads_previous_sound() {
        let (mut player, factory) = player();
        player.set_url(Source::new("/a.wav", true)).unwrap();
        player.set_url(Source::new("/b.wav", true)).unwrap();
        assert!(factory.pool.called("unload:1"));
        assert!(factory.pool.called("load:/b.wav"));
    }

    #[test]
    fn replaying_fires_a_fresh_stream_and_stops_the_old_one() {
        let (mut player, factory) = player();
        player.set_url(Source::new("/beep.wav", true)).unwrap();
        player.on_engine_event(EngineEvent::Loaded);
        player.play().unwrap();
        player.play().unwrap();
        assert_eq!(factory.pool.count("play:1"), 2);
        assert!(factory.pool.called("stop:2"));
    }

    #[test]
    fn released_session_reloads_the_same_url() {
        let (mut player, factory) = player();
        player.set_url(Source::new("/beep.wav", true)).unwrap();
        player.on_engine_event(EngineEvent::Loaded);
        player.release();
        assert!(player.snapshot().url.is_none());

        player.set_url(Source::new("/beep.wav", true)).unwrap();
        assert_eq!(factory.pool.count("load:/beep.wav"), 2);
        player.play().unwrap();
    }

    #[test]
    fn failed_load_can_be_retried_with_the_same_url() {
        let (mut player, factory) = player();
        player.set_url(Source::new("/beep.wav", true)).unwrap();
        player.play().unwrap();
        let signals = player.on_engine_event(EngineEvent::Error("unreadable".into()));
        assert_eq!(signals, vec![PlayerSignal::Error("unreadable".into())]);

        player.set_url(Source::new("/beep.wav", true)).unwrap();
        assert_eq!(factory.pool.count("load:/beep.wav"), 2);
        assert!(player.play().is_ok());
    }

    #[test]
    fn play_without_source_fails() {
        let (mut player, _) = player();
        assert!(matches!(player.play(), Err(EngineError::NoSource)));
    }
}
