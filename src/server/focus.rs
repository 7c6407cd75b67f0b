//! Output focus arbitration.
//!
//! Hubs ask a [`FocusService`] for transient, duck-on-conflict focus when a
//! session starts and give it back when nothing is left playing. The shipped
//! [`FocusArbiter`] keeps holders on a stack: a new holder ducks the one
//! below it, and abandoning the top hands focus back down.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{common::ConnectionId, player::FocusChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestResult {
    Failed,
    Granted,
    Delayed,
}

impl FocusRequestResult {
    pub fn code(&self) -> i32 {
        match self {
            Self::Failed => 0,
            Self::Granted => 1,
            Self::Delayed => 2,
        }
    }
}

/// Receives raw focus change codes (see [`FocusChange`]).
pub trait FocusListener: Send + Sync {
    fn on_focus_change(&self, change: i32);
}

pub trait FocusService: Send + Sync {
    fn request_focus(
        &self,
        holder: &ConnectionId,
        listener: Arc<dyn FocusListener>,
    ) -> FocusRequestResult;
    fn abandon_focus(&self, holder: &ConnectionId);
}

type Holder = (ConnectionId, Arc<dyn FocusListener>);

#[derive(Default)]
pub struct FocusArbiter {
    holders: Mutex<Vec<Holder>>,
}

impl FocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder_count(&self) -> usize {
        self.holders.lock().len()
    }
}

impl FocusService for FocusArbiter {
    fn request_focus(
        &self,
        holder: &ConnectionId,
        listener: Arc<dyn FocusListener>,
    ) -> FocusRequestResult {
        let ducked = {
            let mut holders = self.holders.lock();
            if holders.last().is_some_and(|(id, _)| id == holder) {
                return FocusRequestResult::Granted;
            }
            holders.retain(|(id, _)| id != holder);
            let previous = holders.last().map(|(_, l)| l.clone());
            holders.push((holder.clone(), listener));
            previous
        };

        if let Some(previous) = ducked {
            debug!("focus taken by {}, ducking previous holder", holder);
            previous.on_focus_change(FocusChange::LOSS_TRANSIENT_CAN_DUCK);
        }
        FocusRequestResult::Granted
    }

    fn abandon_focus(&self, holder: &ConnectionId) {
        let regained = {
            let mut holders = self.holders.lock();
            let Some(index) = holders.iter().position(|(id, _)| id == holder) else {
                return;
            };
            let was_top = index + 1 == holders.len();
            holders.remove(index);
            if was_top {
                holders.last().map(|(_, l)| l.clone())
            } else {
                None
            }
        };

        if let Some(next) = regained {
            debug!("focus abandoned by {}, restoring next holder", holder);
            next.on_focus_change(FocusChange::GAIN);
        }
    }
}
