use std::{sync::Arc, time::Instant};

use dashmap::DashMap;

use super::{AudioHub, focus::FocusService};
use crate::{common::ConnectionId, configs::Config, engine::EngineFactory};

/// Top-level application state.
pub struct AppState {
    /// One hub per connected client.
    pub hubs: DashMap<ConnectionId, AudioHub>,
    pub engines: Arc<dyn EngineFactory>,
    /// Shared by every hub.
    pub focus: Arc<dyn FocusService>,
    pub config: Config,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        engines: Arc<dyn EngineFactory>,
        focus: Arc<dyn FocusService>,
    ) -> Self {
        Self {
            hubs: DashMap::new(),
            engines,
            focus,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}
