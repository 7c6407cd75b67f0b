use serde::Serialize;
use thiserror::Error;

/// Failures reported by a playback engine or by a player that cannot honour
/// an operation in its current mode or state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{mode} mode does not support: {operation}")]
    Unsupported {
        mode: &'static str,
        operation: &'static str,
    },
    #[error("player has been released")]
    Released,
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    #[error("no source has been set")]
    NoSource,
    #[error("failed to probe {source_ref}: {reason}")]
    Probe { source_ref: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures while decoding or executing one inbound command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid argument {name}: expected {expected}")]
    InvalidArgument {
        name: &'static str,
        expected: &'static str,
    },
    #[error("unknown player mode: {0}")]
    UnknownMode(String),
    #[error("unknown release mode: {0}")]
    UnknownReleaseMode(String),
    #[error("unknown playing route: {0}")]
    UnknownRoute(String),
    #[error("{0}")]
    Engine(#[from] EngineError),
}

/// JSON error body returned by the HTTP routes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Not Found").
    pub error: String,
    pub message: String,
    /// The request path that caused the error.
    pub path: String,
}

impl ErrorResponse {
    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: super::types::now_ms(),
            status: 404,
            error: "Not Found".into(),
            message: message.into(),
            path: path.into(),
        }
    }
}
