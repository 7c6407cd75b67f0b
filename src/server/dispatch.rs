use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, atomic::Ordering},
};

use serde_json::{Value, json};
use tracing::{debug, error};

use super::{hub::HubInner, poller};
use crate::{
    common::{CommandError, PlayerId},
    engine::{PlayingRoute, Source},
    player::{Player, PlayerMode, ReleaseMode},
    protocol::{CallArgs, CallOutcome, Method},
};

/// Hub-level work that follows a session command.
enum FollowUp {
    None,
    /// A session started or resumed: take focus and wake the poller.
    Started,
    /// A session paused, stopped or released.
    Halted,
}

pub(crate) fn dispatch(hub: &Arc<HubInner>, method_name: &str, args: &CallArgs) -> CallOutcome {
    let Some(method) = Method::from_name(method_name) else {
        debug!("[{}] not implemented: {}", hub.connection_id, method_name);
        return CallOutcome::NotImplemented;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| execute(hub, method, args))) {
        Ok(Ok(value)) => CallOutcome::Success(value),
        Ok(Err(e)) => {
            error!("[{}] {} failed: {}", hub.connection_id, method_name, e);
            CallOutcome::Error(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("[{}] {} panicked: {}", hub.connection_id, method_name, message);
            CallOutcome::Error(message)
        }
    }
}

fn execute(hub: &Arc<HubInner>, method: Method, args: &CallArgs) -> Result<Value, CommandError> {
    if method == Method::SetDucking {
        let enable = args.boolean("enable")?;
        hub.ducking.store(enable, Ordering::Relaxed);
        debug!("[{}] ducking = {}", hub.connection_id, enable);
        return Ok(json!(1));
    }

    let player_id = PlayerId::from(args.string("playerId")?);
    let mode = PlayerMode::parse(args.string("mode")?)?;
    debug!("[{}] {:?} -> {}", hub.connection_id, method, player_id);

    let (value, follow_up) = {
        let mut player = hub.registry.resolve(&player_id, mode);
        run(&mut player, method, args)?
    };

    match follow_up {
        FollowUp::Started => {
            hub.request_focus();
            poller::start(hub);
        }
        FollowUp::Halted => hub.abandon_focus(),
        FollowUp::None => {}
    }
    Ok(value)
}

fn run(player: &mut Player, method: Method, args: &CallArgs) -> Result<(Value, FollowUp), CommandError> {
    let ack = json!(1);
    let outcome = match method {
        Method::Play => {
            let url = args.string("url")?;
            let volume = args.number("volume")?;
            let position = args.optional_integer("position")?;
            let respect_silence = args.boolean("respectSilence")?;
            let is_local = args.boolean("isLocal")?;
            let stay_awake = args.boolean("stayAwake")?;

            player.config_attributes(respect_silence, stay_awake)?;
            player.set_volume(volume)?;
            player.set_url(Source::new(url, is_local))?;
            if let Some(position) = position {
                if player.mode() != PlayerMode::LowLatency {
                    player.seek(position)?;
                }
            }
            player.play()?;
            (ack, FollowUp::Started)
        }
        Method::Resume => {
            player.play()?;
            (ack, FollowUp::Started)
        }
        Method::Pause => {
            player.pause()?;
            (ack, FollowUp::Halted)
        }
        Method::Stop => {
            player.stop()?;
            (ack, FollowUp::Halted)
        }
        Method::Release => {
            player.release();
            (ack, FollowUp::Halted)
        }
        Method::Seek => {
            player.seek(args.integer("position")?)?;
            (ack, FollowUp::None)
        }
        Method::SetVolume => {
            player.set_volume(args.number("volume")?)?;
            (ack, FollowUp::None)
        }
        Method::SetUrl => {
            let url = args.string("url")?;
            let is_local = args.boolean("isLocal")?;
            player.set_url(Source::new(url, is_local))?;
            (ack, FollowUp::None)
        }
        Method::SetPlaybackRate => {
            let accepted = player.set_rate(args.number("playbackRate")?)?;
            (json!(accepted), FollowUp::None)
        }
        Method::GetDuration => (json!(player.duration()?), FollowUp::None),
        Method::GetCurrentPosition => (json!(player.current_position()?), FollowUp::None),
        Method::SetReleaseMode => {
            let mode = ReleaseMode::parse(args.string("releaseMode")?)?;
            player.set_release_mode(mode)?;
            (ack, FollowUp::None)
        }
        Method::EarpieceOrSpeakersToggle => {
            let name = args.string("playingRoute")?;
            let route = PlayingRoute::parse(name)
                .ok_or_else(|| CommandError::UnknownRoute(name.to_string()))?;
            player.set_playing_route(route)?;
            (ack, FollowUp::None)
        }
        // Hub-wide; handled before a session is resolved.
        Method::SetDucking => (ack, FollowUp::None),
    };
    Ok(outcome)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "command handler panicked".to_string())
}
