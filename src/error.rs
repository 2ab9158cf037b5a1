//! Error types for the countdown engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the engine, the job store and the alert gate
#[derive(Error, Debug)]
pub enum TimerError {
    /// A background job was requested with nothing left to count down
    #[error("Invalid handoff: remaining duration is zero")]
    InvalidHandoff,

    /// Reading or writing durable state failed
    #[error("Store error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A shared lock was poisoned by a panicking holder
    #[error("Failed to lock {0}")]
    Lock(&'static str),
}

impl TimerError {
    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TimerError>;
