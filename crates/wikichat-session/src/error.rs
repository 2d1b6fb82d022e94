//! Error types for wikichat-session

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using wikichat-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a conversation
#[derive(Error, Debug)]
pub enum Error {
    /// Session creation was rejected or the backend was unreachable
    #[error("Could not start a reply: {0}")]
    InitiationFailed(#[source] wikichat_api::Error),

    /// The reply stream broke before the terminal event
    #[error("Reply stream failed: {0}")]
    StreamFailed(String),

    /// The reply stream went quiet for too long
    #[error("Reply stream idle for {0:?}")]
    StreamTimedOut(Duration),

    /// One pushed event could not be decoded
    #[error("Dropped malformed event: {0}")]
    DecodeFailed(#[source] wikichat_api::Error),

    /// A transcript operation was called in a state it does not support
    #[error("Precondition failed: {0}")]
    PreconditionFailed(&'static str),

    /// A mutation would break the transcript's ordering rules
    #[error("Transcript invariant violated: {0}")]
    InvariantViolation(String),

    /// A reply is still in progress
    #[error("The agent is still replying")]
    Busy,

    /// A second push stream was offered while one is live
    #[error("A reply stream is already open")]
    StreamAlreadyOpen,

    /// Nothing to send
    #[error("Message is empty")]
    EmptyInput,

    /// The in-flight reply was cancelled
    #[error("Reply cancelled")]
    Cancelled,

    /// The session loop is no longer running
    #[error("Session loop has shut down")]
    Closed,
}

/// Serializable error classification carried by events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InitiationFailed,
    StreamFailed,
    StreamTimedOut,
    DecodeFailed,
    PreconditionFailed,
    InvariantViolation,
    Busy,
    StreamAlreadyOpen,
    EmptyInput,
    Cancelled,
    Closed,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InitiationFailed(_) => ErrorKind::InitiationFailed,
            Error::StreamFailed(_) => ErrorKind::StreamFailed,
            Error::StreamTimedOut(_) => ErrorKind::StreamTimedOut,
            Error::DecodeFailed(_) => ErrorKind::DecodeFailed,
            Error::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Error::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Error::Busy => ErrorKind::Busy,
            Error::StreamAlreadyOpen => ErrorKind::StreamAlreadyOpen,
            Error::EmptyInput => ErrorKind::EmptyInput,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Closed => ErrorKind::Closed,
        }
    }

    /// Whether this failure ends a round and gets a notice in the transcript
    pub fn ends_round(&self) -> bool {
        matches!(
            self,
            Error::InitiationFailed(_)
                | Error::StreamFailed(_)
                | Error::StreamTimedOut(_)
                | Error::Cancelled
        )
    }
}
