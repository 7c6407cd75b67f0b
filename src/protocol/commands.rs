use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::events::{OutgoingMessage, ReplyBody};
use crate::common::CommandError;

/// One inbound request frame.
#[derive(Debug, Deserialize)]
pub struct MethodCall {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub args: CallArgs,
}

/// Named arguments of a call. A JSON `null` counts as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CallArgs(Map<String, Value>);

impl CallArgs {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    fn required(&self, name: &'static str) -> Result<&Value, CommandError> {
        self.get(name).ok_or(CommandError::MissingArgument(name))
    }

    pub fn string(&self, name: &'static str) -> Result<&str, CommandError> {
        self.required(name)?
            .as_str()
            .ok_or(CommandError::InvalidArgument {
                name,
                expected: "string",
            })
    }

    pub fn boolean(&self, name: &'static str) -> Result<bool, CommandError> {
        self.required(name)?
            .as_bool()
            .ok_or(CommandError::InvalidArgument {
                name,
                expected: "boolean",
            })
    }

    pub fn number(&self, name: &'static str) -> Result<f64, CommandError> {
        self.required(name)?
            .as_f64()
            .ok_or(CommandError::InvalidArgument {
                name,
                expected: "number",
            })
    }

    /// Integral milliseconds. `1500.0` is accepted, `1500.5` is not.
    pub fn integer(&self, name: &'static str) -> Result<i64, CommandError> {
        let value = self.required(name)?;
        value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
            .ok_or(CommandError::InvalidArgument {
                name,
                expected: "integer",
            })
    }

    pub fn optional_integer(&self, name: &'static str) -> Result<Option<i64>, CommandError> {
        match self.get(name) {
            Some(_) => self.integer(name).map(Some),
            None => Ok(None),
        }
    }
}

/// Commands understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Play,
    Resume,
    Pause,
    Stop,
    Release,
    Seek,
    SetVolume,
    SetUrl,
    SetPlaybackRate,
    GetDuration,
    GetCurrentPosition,
    SetReleaseMode,
    EarpieceOrSpeakersToggle,
    SetDucking,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name {
            "play" => Self::Play,
            "resume" => Self::Resume,
            "pause" => Self::Pause,
            "stop" => Self::Stop,
            "release" => Self::Release,
            "seek" => Self::Seek,
            "setVolume" => Self::SetVolume,
            "setUrl" => Self::SetUrl,
            "setPlaybackRate" => Self::SetPlaybackRate,
            "getDuration" => Self::GetDuration,
            "getCurrentPosition" => Self::GetCurrentPosition,
            "setReleaseMode" => Self::SetReleaseMode,
            "earpieceOrSpeakersToggle" => Self::EarpieceOrSpeakersToggle,
            _ if name.eq_ignore_ascii_case("setDucking") => Self::SetDucking,
            _ => return None,
        };
        Some(method)
    }
}

/// Result of dispatching one call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(Value),
    NotImplemented,
    Error(String),
}

impl CallOutcome {
    pub fn ack() -> Self {
        Self::Success(json!(1))
    }

    pub fn into_reply(self, id: u64) -> OutgoingMessage {
        let body = match self {
            Self::Success(value) => ReplyBody::Success { value },
            Self::NotImplemented => ReplyBody::NotImplemented {},
            Self::Error(message) => ReplyBody::Error {
                code: ReplyBody::ERROR_CODE,
                message,
            },
        };
        OutgoingMessage::Reply { id, body }
    }
}
