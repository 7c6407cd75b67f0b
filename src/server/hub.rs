use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::Duration};
use tracing::{debug, info};

use super::{
    dispatch,
    focus::{FocusListener, FocusService},
    poller::{self, PollerSlot},
    registry::Registry,
};
use crate::{
    common::{ConnectionId, PlayerId},
    configs::PlayerConfig,
    engine::{EngineFactory, Notice},
    player::{FocusChange, PlayerEnv, PlayerSignal, PlayerSnapshot},
    protocol::{CallArgs, CallOutcome, PlayerEvent},
};

/// Playback manager of one connected client: its sessions, its poller and its
/// share of output focus.
#[derive(Clone)]
pub struct AudioHub {
    pub(crate) inner: Arc<HubInner>,
}

pub(crate) struct HubInner {
    pub(crate) connection_id: ConnectionId,
    pub(crate) registry: Registry,
    pub(crate) ducking: AtomicBool,
    pub(crate) events: flume::Sender<PlayerEvent>,
    pub(crate) poller: Mutex<PollerSlot>,
    pub(crate) poll_interval: Duration,
    focus: Arc<dyn FocusService>,
    focus_listener: Arc<dyn FocusListener>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Forwards focus changes to a hub without keeping it alive.
struct HubFocusListener {
    hub: Weak<HubInner>,
}

impl FocusListener for HubFocusListener {
    fn on_focus_change(&self, change: i32) {
        if let Some(hub) = self.hub.upgrade() {
            hub.on_focus_change(change);
        }
    }
}

impl AudioHub {
    /// Creates a hub and starts its engine-callback pump. Must be called from
    /// within a tokio runtime.
    pub fn new(
        connection_id: ConnectionId,
        factory: Arc<dyn EngineFactory>,
        focus: Arc<dyn FocusService>,
        config: &PlayerConfig,
    ) -> (Self, flume::Receiver<PlayerEvent>) {
        let (events_tx, events_rx) = flume::unbounded();
        let (notice_tx, notice_rx) = flume::unbounded();

        let inner = Arc::new_cyclic(|weak: &Weak<HubInner>| HubInner {
            registry: Registry::new(PlayerEnv {
                factory,
                notices: notice_tx,
                duck_volume: config.duck_volume,
            }),
            connection_id,
            ducking: AtomicBool::new(false),
            events: events_tx,
            poller: Mutex::new(PollerSlot::default()),
            poll_interval: Duration::from_millis(config.position_update_interval_ms.max(1)),
            focus,
            focus_listener: Arc::new(HubFocusListener { hub: weak.clone() }),
            pump: Mutex::new(None),
        });

        let pump = tokio::spawn(pump_notices(Arc::downgrade(&inner), notice_rx));
        *inner.pump.lock() = Some(pump);

        (Self { inner }, events_rx)
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.inner.connection_id
    }

    /// Runs one command. Never panics; failures come back as
    /// [`CallOutcome::Error`].
    pub fn dispatch(&self, method: &str, args: &CallArgs) -> CallOutcome {
        dispatch::dispatch(&self.inner, method, args)
    }

    /// Delivers a raw focus change code to every session.
    pub fn on_focus_change(&self, change: i32) {
        self.inner.on_focus_change(change);
    }

    pub fn ducking(&self) -> bool {
        self.inner.ducking.load(Ordering::Relaxed)
    }

    pub fn poller_running(&self) -> bool {
        self.inner.poller.lock().is_running()
    }

    pub fn player_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn playing_count(&self) -> usize {
        self.inner.registry.playing_count()
    }

    pub fn has_player(&self, id: &PlayerId) -> bool {
        self.inner.registry.contains(id)
    }

    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.inner.registry.snapshots()
    }

    /// Stops polling, releases every session and leaves the focus stack.
    pub fn shutdown(&self) {
        info!("Shutting down hub: {}", self.inner.connection_id);
        poller::stop(&self.inner);
        for mut player in self.inner.registry.iter_mut() {
            player.release();
        }
        self.inner.focus.abandon_focus(&self.inner.connection_id);
    }
}

impl HubInner {
    pub(crate) fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn request_focus(&self) {
        let result = self
            .focus
            .request_focus(&self.connection_id, self.focus_listener.clone());
        info!(
            "[{}] focus request result: {}",
            self.connection_id,
            result.code()
        );
    }

    /// Gives focus back, but only when ducking is enabled and no session is
    /// still playing.
    pub(crate) fn abandon_focus(&self) {
        if !self.ducking.load(Ordering::Relaxed) || self.registry.any_actually_playing() {
            return;
        }
        debug!("[{}] abandoning focus", self.connection_id);
        self.focus.abandon_focus(&self.connection_id);
    }

    pub(crate) fn on_focus_change(self: &Arc<Self>, change: i32) {
        let Some(change) = FocusChange::from_code(change) else {
            debug!("[{}] ignoring focus change {}", self.connection_id, change);
            return;
        };

        let mut pending = Vec::new();
        for mut player in self.registry.iter_mut() {
            let signals = player.on_focus_change(change);
            if !signals.is_empty() {
                pending.push((player.key().clone(), signals));
            }
        }
        for (player_id, signals) in pending {
            self.apply_signals(&player_id, signals);
        }
    }

    fn handle_notice(self: &Arc<Self>, notice: Notice) {
        let signals = match self.registry.get_mut(&notice.player_id) {
            Some(mut player) => player.on_engine_event(notice.event),
            None => return,
        };
        self.apply_signals(&notice.player_id, signals);
    }

    /// Acts on follow-ups reported by a session. Registry guards must already
    /// be released.
    pub(crate) fn apply_signals(self: &Arc<Self>, player_id: &PlayerId, signals: Vec<PlayerSignal>) {
        for signal in signals {
            match signal {
                PlayerSignal::Duration(ms) => self.emit(PlayerEvent::duration(player_id, ms)),
                PlayerSignal::IsPlaying => poller::start(self),
                PlayerSignal::Completed => {
                    self.emit(PlayerEvent::complete(player_id));
                    self.abandon_focus();
                }
                PlayerSignal::Error(message) => self.emit(PlayerEvent::error(player_id, message)),
            }
        }
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        debug!("Dropping hub: {}", self.connection_id);
        if let Some(task) = self.poller.get_mut().take_task() {
            task.abort();
        }
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

/// Drains engine callbacks into the hub.
async fn pump_notices(hub: Weak<HubInner>, rx: flume::Receiver<Notice>) {
    while let Ok(notice) = rx.recv_async().await {
        let Some(hub) = hub.upgrade() else {
            break;
        };
        hub.handle_notice(notice);
    }
}
