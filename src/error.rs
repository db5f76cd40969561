// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Problems loading or validating an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Problems reading a recorded keypoint stream.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read keypoint dump {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: malformed frame record: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("keypoint dump {0} contains no frames")]
    Empty(PathBuf),
}

/// A pose-model failure reported for a single frame.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("pose detection failed: {0}")]
pub struct DetectionError(pub String);

/// Delivery failure inside an [`EventSink`](crate::events::EventSink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event sink is closed")]
    Closed,

    #[error("midi transport error: {0}")]
    Transport(String),
}
