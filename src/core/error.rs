//! Error types for the alert pipeline.
//!
//! None of these are fatal to a running engine: callers log them and keep
//! processing events.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A payload that cannot be classified at all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizationError {
    /// Binary payload that is not valid UTF-8 text
    #[error("payload is not text ({len} bytes)")]
    NotText { len: usize },

    /// Document payload that is not a record (array, number, ...)
    #[error("document payload is not a record: {0}")]
    NotARecord(String),
}

/// Transport-level failure inside an event source adapter.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed by peer")]
    Closed,
}

/// Failure in a feedback modality. Never rolls back an alert transition.
#[derive(Debug, Error)]
pub enum FeedbackDispatchError {
    #[error("sound clip not found: {0}")]
    SoundMissing(PathBuf),

    #[error("failed to decode sound clip {clip}: {reason}")]
    Decode { clip: String, reason: String },

    #[error("audio output unavailable: {0}")]
    AudioUnavailable(String),

    #[error("sound playback failed for {0}")]
    PlaybackFailed(String),

    #[error("feedback dispatcher is not running")]
    DispatcherGone,
}

/// Crate-level error for everything outside the event loop.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Feedback(#[from] FeedbackDispatchError),

    #[error("config error: {0}")]
    Config(#[from] io::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}
