//! Headless backend: tracks playback time against the runtime clock without
//! producing sound. Durations come from probing the real media with
//! symphonia, so positions, completions and seeks behave as they would on a
//! device. Useful for servers without an output device and for CI.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use super::{
    EngineEvent, EngineEvents, EngineFactory, MediaEngine, OutputAttributes, SoundId, SoundPool,
    Source, StreamId, probe::Prober,
};
use crate::{
    common::{EngineError, Shared},
    configs::PlayerConfig,
};

pub struct HeadlessBackend {
    prober: Prober,
    pool: Arc<HeadlessPool>,
}

impl HeadlessBackend {
    pub fn new(config: &PlayerConfig) -> Result<Self, EngineError> {
        let prober = Prober::new(config.http_timeout_ms, config.probe_max_bytes)?;
        Ok(Self {
            pool: Arc::new(HeadlessPool::new(prober.clone())),
            prober,
        })
    }
}

impl EngineFactory for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn media_engine(&self, events: EngineEvents) -> Box<dyn MediaEngine> {
        Box::new(HeadlessEngine::new(self.prober.clone(), events))
    }

    fn sound_pool(&self) -> Arc<dyn SoundPool> {
        self.pool.clone()
    }
}

fn runtime() -> Result<Handle, EngineError> {
    Handle::try_current().map_err(|_| EngineError::IllegalState("no async runtime available"))
}

struct Clock {
    prepared: bool,
    duration_ms: Option<i64>,
    /// Position at `started_at`, or the frozen position when not running.
    anchor_ms: i64,
    started_at: Option<Instant>,
    rate: f64,
    looping: bool,
    /// Bumped by `reset`; stale loaders compare against it.
    generation: u64,
    /// Bumped by every timing change; stale completion timers compare against it.
    timeline: u64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            prepared: false,
            duration_ms: None,
            anchor_ms: 0,
            started_at: None,
            rate: 1.0,
            looping: false,
            generation: 0,
            timeline: 0,
        }
    }
}

impl Clock {
    fn running(&self) -> bool {
        self.started_at.is_some()
    }

    fn position(&self) -> i64 {
        let elapsed = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64() * 1000.0 * self.rate)
            .unwrap_or(0.0);
        let raw = self.anchor_ms + elapsed as i64;
        match self.duration_ms {
            Some(d) if d > 0 && self.looping => raw % d,
            Some(d) if d > 0 => raw.min(d),
            _ => raw,
        }
    }

    /// Re-anchors at the current position so a parameter change applies from now.
    fn rebase(&mut self) {
        let running = self.running();
        self.anchor_ms = self.position();
        self.started_at = running.then(Instant::now);
        self.timeline += 1;
    }

    fn freeze(&mut self) {
        self.anchor_ms = self.position();
        self.started_at = None;
        self.timeline += 1;
    }

    fn remaining(&self) -> Option<Duration> {
        if !self.running() || self.looping {
            return None;
        }
        let duration = self.duration_ms.filter(|d| *d > 0)?;
        let left_ms = (duration - self.position()).max(0) as f64 / self.rate;
        Some(Duration::from_secs_f64(left_ms / 1000.0))
    }
}

pub struct HeadlessEngine {
    prober: Prober,
    events: EngineEvents,
    source: Option<Source>,
    clock: Shared<Clock>,
    volume: f64,
    attributes: OutputAttributes,
    loader: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl HeadlessEngine {
    pub fn new(prober: Prober, events: EngineEvents) -> Self {
        Self {
            prober,
            events,
            source: None,
            clock: Arc::new(Mutex::new(Clock::default())),
            volume: 1.0,
            attributes: OutputAttributes::default(),
            loader: None,
            timer: None,
        }
    }

    fn require_prepared(&self, what: &'static str) -> Result<(), EngineError> {
        if self.clock.lock().prepared {
            Ok(())
        } else {
            Err(EngineError::IllegalState(what))
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn schedule_completion(&mut self) {
        self.cancel_timer();
        let (remaining, timeline) = {
            let clock = self.clock.lock();
            (clock.remaining(), clock.timeline)
        };
        let Some(remaining) = remaining else {
            return;
        };
        let Ok(runtime) = runtime() else {
            return;
        };

        let clock = self.clock.clone();
        let events = self.events.clone();
        self.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(remaining).await;
            {
                let mut clock = clock.lock();
                if clock.timeline != timeline || !clock.running() {
                    return;
                }
                clock.anchor_ms = clock.duration_ms.unwrap_or_default();
                clock.started_at = None;
                clock.timeline += 1;
            }
            events.emit(EngineEvent::Completed);
        }));
    }
}

impl MediaEngine for HeadlessEngine {
    fn set_source(&mut self, source: &Source) -> Result<(), EngineError> {
        self.source = Some(source.clone());
        Ok(())
    }

    fn prepare_async(&mut self) -> Result<(), EngineError> {
        let source = self.source.clone().ok_or(EngineError::NoSource)?;
        let runtime = runtime()?;
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }

        let generation = self.clock.lock().generation;
        let prober = self.prober.clone();
        let clock = self.clock.clone();
        let events = self.events.clone();
        self.loader = Some(runtime.spawn(async move {
            match prober.duration_ms(&source).await {
                Ok(duration) => {
                    {
                        let mut clock = clock.lock();
                        if clock.generation != generation {
                            return;
                        }
                        clock.duration_ms = Some(duration);
                        clock.prepared = true;
                    }
                    debug!(
                        "[{}] prepared {} ({} ms)",
                        events.player_id(),
                        source.url(),
                        duration
                    );
                    events.emit(EngineEvent::Prepared);
                }
                Err(e) => {
                    warn!("[{}] prepare failed: {}", events.player_id(), e);
                    events.emit(EngineEvent::Error(e.to_string()));
                }
            }
        }));
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        {
            let mut clock = self.clock.lock();
            if !clock.prepared {
                return Err(EngineError::IllegalState("start called before prepare completed"));
            }
            if clock.running() {
                return Ok(());
            }
            if let Some(d) = clock.duration_ms {
                if d > 0 && clock.anchor_ms >= d {
                    clock.anchor_ms = 0;
                }
            }
            clock.started_at = Some(Instant::now());
            clock.timeline += 1;
        }
        self.schedule_completion();
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.require_prepared("pause called before prepare completed")?;
        self.clock.lock().freeze();
        self.cancel_timer();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        {
            let mut clock = self.clock.lock();
            clock.freeze();
            clock.anchor_ms = 0;
        }
        self.cancel_timer();
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
        self.cancel_timer();
        let mut clock = self.clock.lock();
        let generation = clock.generation + 1;
        *clock = Clock {
            generation,
            ..Clock::default()
        };
        self.source = None;
    }

    fn release(&mut self) {
        self.reset();
    }

    fn seek_to(&mut self, position_ms: i64) -> Result<(), EngineError> {
        self.require_prepared("seek called before prepare completed")?;
        {
            let mut clock = self.clock.lock();
            let target = match clock.duration_ms {
                Some(d) if d > 0 => position_ms.clamp(0, d),
                _ => position_ms.max(0),
            };
            clock.anchor_ms = target;
            if clock.running() {
                clock.started_at = Some(Instant::now());
            }
            clock.timeline += 1;
        }
        self.schedule_completion();
        self.events.emit(EngineEvent::SeekCompleted);
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    fn set_looping(&mut self, looping: bool) {
        {
            let mut clock = self.clock.lock();
            clock.rebase();
            clock.looping = looping;
        }
        self.schedule_completion();
    }

    fn set_rate(&mut self, rate: f64) -> Result<bool, EngineError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Ok(false);
        }
        {
            let mut clock = self.clock.lock();
            clock.rebase();
            clock.rate = rate;
        }
        self.schedule_completion();
        Ok(true)
    }

    fn set_attributes(&mut self, attributes: OutputAttributes) {
        if attributes.route != self.attributes.route {
            debug!(
                "[{}] output routed to {:?}",
                self.events.player_id(),
                attributes.route
            );
        }
        self.attributes = attributes;
    }

    fn duration(&self) -> Result<i64, EngineError> {
        let clock = self.clock.lock();
        match (clock.prepared, clock.duration_ms) {
            (true, Some(d)) => Ok(d),
            _ => Err(EngineError::IllegalState("duration is unknown until prepared")),
        }
    }

    fn current_position(&self) -> Result<i64, EngineError> {
        Ok(self.clock.lock().position())
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
        self.cancel_timer();
    }
}

#[derive(Debug, Clone)]
struct SoundEntry {
    source: Source,
    /// `Some` once loading finished.
    duration_ms: Option<i64>,
}

/// State of one fired pool stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub sound: SoundId,
    pub volume: f64,
    pub rate: f64,
    pub looping: bool,
    pub paused: bool,
    duration_ms: i64,
    /// Media time played before `resumed_at`.
    played_ms: f64,
    resumed_at: Option<Instant>,
}

impl StreamEntry {
    /// Folds the running span into `played_ms`.
    fn settle(&mut self) {
        if let Some(at) = self.resumed_at.take() {
            self.played_ms += at.elapsed().as_secs_f64() * 1000.0 * self.rate;
            if !self.paused {
                self.resumed_at = Some(Instant::now());
            }
        }
    }

    fn finished(&self) -> bool {
        if self.looping {
            return false;
        }
        let running = self
            .resumed_at
            .map_or(0.0, |at| at.elapsed().as_secs_f64() * 1000.0 * self.rate);
        self.played_ms + running >= self.duration_ms as f64
    }
}

pub struct HeadlessPool {
    prober: Prober,
    sounds: Arc<DashMap<SoundId, SoundEntry>>,
    streams: DashMap<StreamId, StreamEntry>,
    next_id: AtomicU32,
}

impl HeadlessPool {
    pub fn new(prober: Prober) -> Self {
        Self {
            prober,
            sounds: Arc::new(DashMap::new()),
            streams: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn stream(&self, stream: StreamId) -> Option<StreamEntry> {
        self.streams.get(&stream).map(|s| s.clone())
    }

    /// Drops one-shot streams that played to the end.
    fn retire_finished(&self) {
        self.streams.retain(|_, s| !s.finished());
    }

    pub fn live_streams(&self) -> usize {
        self.retire_finished();
        self.streams.len()
    }

    fn update(&self, stream: StreamId, f: impl FnOnce(&mut StreamEntry)) {
        if let Some(mut entry) = self.streams.get_mut(&stream) {
            f(&mut entry);
        }
    }
}

impl SoundPool for HeadlessPool {
    fn load(&self, source: &Source, events: EngineEvents) -> Result<SoundId, EngineError> {
        let runtime = runtime()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sounds.insert(
            id,
            SoundEntry {
                source: source.clone(),
                duration_ms: None,
            },
        );

        let prober = self.prober.clone();
        let sounds = self.sounds.clone();
        let source = source.clone();
        runtime.spawn(async move {
            match prober.duration_ms(&source).await {
                Ok(duration) => {
                    match sounds.get_mut(&id) {
                        Some(mut sound) => sound.duration_ms = Some(duration),
                        None => return,
                    }
                    events.emit(EngineEvent::Loaded);
                }
                Err(e) => {
                    warn!("[{}] pool load failed: {}", events.player_id(), e);
                    sounds.remove(&id);
                    events.emit(EngineEvent::Error(e.to_string()));
                }
            }
        });
        Ok(id)
    }

    fn unload(&self, sound: SoundId) {
        if let Some((_, entry)) = self.sounds.remove(&sound) {
            debug!("unloaded sound {} ({})", sound, entry.source.url());
        }
        self.streams.retain(|_, s| s.sound != sound);
    }

    fn play(
        &self,
        sound: SoundId,
        volume: f64,
        looping: bool,
        rate: f64,
    ) -> Result<StreamId, EngineError> {
        let Some(duration_ms) = self.sounds.get(&sound).and_then(|s| s.duration_ms) else {
            return Err(EngineError::IllegalState("sound is not loaded"));
        };
        self.retire_finished();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.insert(
            id,
            StreamEntry {
                sound,
                volume,
                rate,
                looping,
                paused: false,
                duration_ms,
                played_ms: 0.0,
                resumed_at: Some(Instant::now()),
            },
        );
        Ok(id)
    }

    fn pause(&self, stream: StreamId) {
        self.update(stream, |s| {
            s.paused = true;
            s.settle();
        });
    }

    fn resume(&self, stream: StreamId) {
        self.update(stream, |s| {
            if s.paused {
                s.paused = false;
                s.resumed_at = Some(Instant::now());
            }
        });
    }

    fn stop(&self, stream: StreamId) {
        self.streams.remove(&stream);
    }

    fn set_volume(&self, stream: StreamId, volume: f64) {
        self.update(stream, |s| s.volume = volume);
    }

    fn set_rate(&self, stream: StreamId, rate: f64) {
        self.update(stream, |s| {
            s.settle();
            s.rate = rate;
        });
    }

    fn set_loop(&self, stream: StreamId, looping: bool) {
        self.update(stream, |s| s.looping = looping);
    }
}
