//! Error types for the engine client.
//!
//! Every operation returns [`EngineResult`]. The variants separate failures the
//! caller can act on (an index that already exists, a health wait that ran out
//! of time) from fatal transport problems and from errors the engine itself
//! reported, which are passed through untouched.

// Variant fields are described by their #[error(...)] messages
#![allow(missing_docs)]

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::index::HealthState;
use crate::version::EngineVersion;

/// The error type for all engine client operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine could not be reached, or it answered with something that is
    /// not a valid response for the request.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// A create-index call targeted an index that is already there.
    #[error("index already exists")]
    IndexAlreadyExists { index: String },

    /// The health wait deadline elapsed before the index became usable.
    #[error(
        "index {index} did not reach yellow health within {} (last health: {last_health})",
        format_waited(.waited)
    )]
    Timeout {
        index: String,
        waited: Duration,
        last_health: HealthState,
    },

    /// A structured error returned by the engine, kept as-is.
    #[error("engine returned status {status}: {body}")]
    EngineReported { status: u16, body: Value },

    /// An ingest pipeline was requested from an engine that cannot run them.
    #[error("ingest pipelines are not supported by engine version {version}")]
    IngestUnsupported { version: EngineVersion },

    /// The client could not be built from its configuration.
    #[error("invalid client configuration: {message}")]
    InvalidConfig { message: String },
}

fn format_waited(waited: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*waited)
}

impl EngineError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        EngineError::Connection {
            message: message.into(),
        }
    }

    /// Returns the engine's error type (`error.type`) for engine-reported
    /// failures, if the body carries one.
    pub fn engine_error_type(&self) -> Option<&str> {
        match self {
            EngineError::EngineReported { body, .. } => body
                .get("error")
                .and_then(|e| e.get("type"))
                .and_then(|t| t.as_str()),
            _ => None,
        }
    }

    /// Returns true for errors a caller may reasonably retry or treat as
    /// success: an existing index or an expired health wait.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::IndexAlreadyExists { .. } | EngineError::Timeout { .. }
        )
    }
}

impl From<elasticsearch::Error> for EngineError {
    fn from(err: elasticsearch::Error) -> Self {
        EngineError::connection(err.to_string())
    }
}

/// Result type alias for engine client operations.
pub type EngineResult<T> = Result<T, EngineError>;
