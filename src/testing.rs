//! In-memory engines and focus service for unit tests.

use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{
    common::{ConnectionId, EngineError, Shared},
    configs::PlayerConfig,
    engine::{
        EngineEvent, EngineEvents, EngineFactory, MediaEngine, Notice, OutputAttributes, SoundId,
        SoundPool, Source, StreamId,
    },
    player::PlayerEnv,
    protocol::{EventKind, PlayerEvent},
    server::{AudioHub, FocusListener, FocusRequestResult, FocusService},
};

/// Calls recorded by one scripted engine, plus the values it reports.
pub(crate) struct EngineState {
    pub calls: Vec<String>,
    pub duration_ms: i64,
    pub position_ms: i64,
}

impl EngineState {
    pub fn called(&self, call: &str) -> bool {
        self.calls.iter().any(|c| c == call)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

/// Records every call. `prepare_async` and `seek_to` report completion right
/// away; a source whose url contains "panic" makes `set_source` panic.
struct ScriptedEngine {
    state: Shared<EngineState>,
    events: EngineEvents,
}

impl ScriptedEngine {
    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

impl MediaEngine for ScriptedEngine {
    fn set_source(&mut self, source: &Source) -> Result<(), EngineError> {
        if source.url().contains("panic") {
            panic!("engine rejected {}", source.url());
        }
        self.record(format!("source:{}", source.url()));
        Ok(())
    }

    fn prepare_async(&mut self) -> Result<(), EngineError> {
        self.record("prepare".into());
        self.events.emit(EngineEvent::Prepared);
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.record("start".into());
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.record("pause".into());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.record("stop".into());
        Ok(())
    }

    fn reset(&mut self) {
        self.record("reset".into());
    }

    fn release(&mut self) {
        self.record("release".into());
    }

    fn seek_to(&mut self, position_ms: i64) -> Result<(), EngineError> {
        self.record(format!("seek:{position_ms}"));
        self.events.emit(EngineEvent::SeekCompleted);
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        self.record(format!("volume:{volume}"));
    }

    fn set_looping(&mut self, looping: bool) {
        self.record(format!("looping:{looping}"));
    }

    fn set_rate(&mut self, rate: f64) -> Result<bool, EngineError> {
        self.record(format!("rate:{rate}"));
        Ok(true)
    }

    fn set_attributes(&mut self, attributes: OutputAttributes) {
        self.record(format!("attributes:{:?}", attributes.route));
    }

    fn duration(&self) -> Result<i64, EngineError> {
        Ok(self.state.lock().duration_ms)
    }

    fn current_position(&self) -> Result<i64, EngineError> {
        Ok(self.state.lock().position_ms)
    }
}

pub(crate) struct ScriptedFactory {
    engines: Mutex<Vec<(EngineEvents, Shared<EngineState>)>>,
    pub pool: Arc<ScriptedPool>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            engines: Mutex::new(Vec::new()),
            pool: Arc::new(ScriptedPool::default()),
        })
    }

    pub fn engine_count(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn last_engine(&self) -> Shared<EngineState> {
        let engines = self.engines.lock();
        engines.last().map(|(_, s)| s.clone()).expect("no engine created")
    }

    /// Most recent engine built for `player_id`.
    pub fn engine_of(&self, player_id: &str) -> Shared<EngineState> {
        let engines = self.engines.lock();
        engines
            .iter()
            .rev()
            .find(|(events, _)| events.player_id().0 == player_id)
            .map(|(_, s)| s.clone())
            .expect("no engine for player")
    }

    /// Reports natural completion from the engine of `player_id`.
    pub fn complete(&self, player_id: &str) {
        let engines = self.engines.lock();
        if let Some((events, _)) = engines
            .iter()
            .rev()
            .find(|(events, _)| events.player_id().0 == player_id)
        {
            events.emit(EngineEvent::Completed);
        }
    }
}

impl EngineFactory for ScriptedFactory {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn media_engine(&self, events: EngineEvents) -> Box<dyn MediaEngine> {
        let state = Arc::new(Mutex::new(EngineState {
            calls: Vec::new(),
            duration_ms: 5_000,
            position_ms: 0,
        }));
        self.engines.lock().push((events.clone(), state.clone()));
        Box::new(ScriptedEngine { state, events })
    }

    fn sound_pool(&self) -> Arc<dyn SoundPool> {
        self.pool.clone()
    }
}

/// Records every call; loads complete immediately.
pub(crate) struct ScriptedPool {
    calls: Mutex<Vec<String>>,
    next_id: AtomicU32,
}

impl Default for ScriptedPool {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }
}

impl ScriptedPool {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn next(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c == call)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }
}

impl SoundPool for ScriptedPool {
    fn load(&self, source: &Source, events: EngineEvents) -> Result<SoundId, EngineError> {
        let id = self.next();
        self.record(format!("load:{}", source.url()));
        events.emit(EngineEvent::Loaded);
        Ok(id)
    }

    fn unload(&self, sound: SoundId) {
        self.record(format!("unload:{sound}"));
    }

    fn play(
        &self,
        sound: SoundId,
        _volume: f64,
        _looping: bool,
        _rate: f64,
    ) -> Result<StreamId, EngineError> {
        self.record(format!("play:{sound}"));
        Ok(self.next())
    }

    fn pause(&self, stream: StreamId) {
        self.record(format!("pause:{stream}"));
    }

    fn resume(&self, stream: StreamId) {
        self.record(format!("resume:{stream}"));
    }

    fn stop(&self, stream: StreamId) {
        self.record(format!("stop:{stream}"));
    }

    fn set_volume(&self, stream: StreamId, volume: f64) {
        self.record(format!("volume:{stream}:{volume}"));
    }

    fn set_rate(&self, stream: StreamId, rate: f64) {
        self.record(format!("rate:{stream}:{rate}"));
    }

    fn set_loop(&self, stream: StreamId, looping: bool) {
        self.record(format!("loop:{stream}:{looping}"));
    }
}

/// Counts requests and abandons; always grants.
#[derive(Default)]
pub(crate) struct RecordingFocus {
    requests: AtomicUsize,
    abandons: AtomicUsize,
}

impl RecordingFocus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn abandons(&self) -> usize {
        self.abandons.load(Ordering::SeqCst)
    }
}

impl FocusService for RecordingFocus {
    fn request_focus(&self, _: &ConnectionId, _: Arc<dyn FocusListener>) -> FocusRequestResult {
        self.requests.fetch_add(1, Ordering::SeqCst);
        FocusRequestResult::Granted
    }

    fn abandon_focus(&self, _: &ConnectionId) {
        self.abandons.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn player_env(factory: Arc<ScriptedFactory>) -> (PlayerEnv, flume::Receiver<Notice>) {
    let (tx, rx) = flume::unbounded();
    let env = PlayerEnv {
        factory,
        notices: tx,
        duck_volume: 0.2,
    };
    (env, rx)
}

pub(crate) fn test_hub(
    factory: Arc<ScriptedFactory>,
    focus: Arc<dyn FocusService>,
) -> (AudioHub, flume::Receiver<PlayerEvent>) {
    AudioHub::new(
        ConnectionId::generate(),
        factory,
        focus,
        &PlayerConfig::default(),
    )
}

/// Waits for the next event of `kind`, skipping others.
pub(crate) async fn next_event(rx: &flume::Receiver<PlayerEvent>, kind: EventKind) -> PlayerEvent {
    loop {
        let event = rx.recv_async().await.expect("event channel closed");
        if event.kind == kind {
            return event;
        }
    }
}
