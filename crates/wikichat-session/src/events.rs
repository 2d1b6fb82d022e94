//! Session event types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::listener::CloseReason;

/// Events emitted while the orchestrator runs rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A user entry triggered a new round
    RoundStart { round: Uuid, user_index: usize },

    /// The backend acknowledged the session
    SessionCreated { round: Uuid },

    /// The reply stream is open
    StreamOpened { round: Uuid },

    /// A malformed pushed event was skipped
    EventDropped { round: Uuid, message: String },

    /// The reply stream closed
    StreamClosed { round: Uuid, reason: CloseReason },

    /// A submission was held back until the current round ends
    Queued { text: String, pending: usize },

    /// A user-visible failure
    Error { kind: ErrorKind, message: String },

    /// The round is over and the input surface may submit again
    RoundEnd { round: Uuid },
}

impl ChatEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::RoundEnd { .. })
    }
}
