use serde::Serialize;
use serde_json::{Value, json};

use crate::common::{ConnectionId, PlayerId};

/// Frames sent from the host to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Ready {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },
    Reply {
        id: u64,
        #[serde(flatten)]
        body: ReplyBody,
    },
    Event {
        method: &'static str,
        args: EventArgs,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ReplyBody {
    Success { value: Value },
    Error { code: &'static str, message: String },
    NotImplemented {},
}

impl ReplyBody {
    pub const ERROR_CODE: &'static str = "Unexpected error!";
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventArgs {
    pub player_id: PlayerId,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Duration,
    CurrentPosition,
    SeekComplete,
    Complete,
    Error,
}

impl EventKind {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Duration => "audio.onDuration",
            Self::CurrentPosition => "audio.onCurrentPosition",
            Self::SeekComplete => "audio.onSeekComplete",
            Self::Complete => "audio.onComplete",
            Self::Error => "audio.onError",
        }
    }
}

/// Event addressed to one session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub kind: EventKind,
    pub player_id: PlayerId,
    pub value: Value,
}

impl PlayerEvent {
    fn new(kind: EventKind, player_id: &PlayerId, value: Value) -> Self {
        Self {
            kind,
            player_id: player_id.clone(),
            value,
        }
    }

    pub fn duration(player_id: &PlayerId, ms: i64) -> Self {
        Self::new(EventKind::Duration, player_id, json!(ms))
    }

    pub fn position(player_id: &PlayerId, ms: i64) -> Self {
        Self::new(EventKind::CurrentPosition, player_id, json!(ms))
    }

    pub fn seek_complete(player_id: &PlayerId) -> Self {
        Self::new(EventKind::SeekComplete, player_id, json!(true))
    }

    pub fn complete(player_id: &PlayerId) -> Self {
        Self::new(EventKind::Complete, player_id, json!(true))
    }

    pub fn error(player_id: &PlayerId, message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, player_id, Value::String(message.into()))
    }

    pub fn into_message(self) -> OutgoingMessage {
        OutgoingMessage::Event {
            method: self.kind.method(),
            args: EventArgs {
                player_id: self.player_id,
                value: self.value,
            },
        }
    }
}
