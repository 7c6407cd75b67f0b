//! The shared position poller of a hub.
//!
//! One task per hub. It fires immediately when started, then once per
//! interval, and reports duration, position and completed seeks for every
//! session that is actually playing. When a tick finds nothing playing the
//! task goes idle; the next session to start playing wakes it again.

use std::sync::{Arc, Weak};

use tokio::{
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};
use tracing::debug;

use super::hub::HubInner;
use crate::protocol::PlayerEvent;

#[derive(Default)]
pub(crate) struct PollerSlot {
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl PollerSlot {
    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub(crate) fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }
}

enum Tick {
    Continue,
    Idle,
    Closed,
}

/// Starts the poller unless it is already running.
pub(crate) fn start(hub: &Arc<HubInner>) {
    let mut slot = hub.poller.lock();
    if slot.is_running() {
        return;
    }
    slot.generation += 1;
    debug!("[{}] position poller started", hub.connection_id);
    slot.task = Some(tokio::spawn(run(
        Arc::downgrade(hub),
        hub.poll_interval,
        slot.generation,
    )));
}

pub(crate) fn stop(hub: &HubInner) {
    if let Some(task) = hub.poller.lock().take_task() {
        task.abort();
        debug!("[{}] position poller stopped", hub.connection_id);
    }
}

async fn run(hub: Weak<HubInner>, every: Duration, generation: u64) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(hub) = hub.upgrade() else {
            return;
        };

        match tick(&hub) {
            Tick::Continue => {}
            Tick::Idle => {
                // Decided under the slot lock so a concurrent start is never lost.
                let mut slot = hub.poller.lock();
                if hub.registry.any_actually_playing() {
                    continue;
                }
                if slot.generation == generation {
                    slot.task = None;
                }
                debug!("[{}] position poller idle", hub.connection_id);
                return;
            }
            Tick::Closed => {
                let mut slot = hub.poller.lock();
                if slot.generation == generation {
                    slot.task = None;
                }
                return;
            }
        }
    }
}

fn tick(hub: &HubInner) -> Tick {
    let mut events = Vec::new();
    let mut any_playing = false;

    for mut player in hub.registry.iter_mut() {
        if !player.is_actually_playing() {
            continue;
        }
        any_playing = true;

        let id = player.key().clone();
        if let (Ok(duration), Ok(position)) = (player.duration(), player.current_position()) {
            events.push(PlayerEvent::duration(&id, duration));
            events.push(PlayerEvent::position(&id, position));
            if player.take_seek_finished() {
                events.push(PlayerEvent::seek_complete(&id));
            }
        }
    }

    for event in events {
        if hub.events.send(event).is_err() {
            return Tick::Closed;
        }
    }

    if any_playing { Tick::Continue } else { Tick::Idle }
}
