//! wikichat-session: Streaming chat session state machine
//!
//! This crate turns the backend's pushed reply events into an ordered
//! conversation transcript, and coordinates session creation with the reply
//! stream and the busy signal shown to the input surface.

pub mod activity;
pub mod error;
pub mod events;
pub mod handle;
pub mod listener;
pub mod orchestrator;
pub mod transcript;

#[cfg(test)]
mod mock;

pub use activity::ActivitySignal;
pub use error::{Error, ErrorKind, Result};
pub use events::ChatEvent;
pub use handle::ChatHandle;
pub use listener::{CloseReason, StreamListener};
pub use orchestrator::{
    BusyPolicy, Command, Orchestrator, OrchestratorConfig, ReplyMode, SubmitOutcome,
};
pub use transcript::{ConversationEntry, Transcript, TranscriptEvent};
