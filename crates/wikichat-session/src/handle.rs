//! A cloneable handle for talking to a running orchestrator loop.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    activity::ActivitySignal,
    error::{Error, Result},
    events::ChatEvent,
    orchestrator::{Command, SubmitOutcome},
    transcript::{ConversationEntry, TranscriptEvent},
};

/// A cloneable handle for poking the orchestrator from front-end code.
///
/// All fields are shared, so cloning is cheap.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: Arc<Mutex<CancellationToken>>,
    activity: ActivitySignal,
    chat_events: broadcast::Sender<ChatEvent>,
    transcript_events: broadcast::Sender<TranscriptEvent>,
}

impl ChatHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        cancel: Arc<Mutex<CancellationToken>>,
        activity: ActivitySignal,
        chat_events: broadcast::Sender<ChatEvent>,
        transcript_events: broadcast::Sender<TranscriptEvent>,
    ) -> Self {
        Self {
            commands,
            cancel,
            activity,
            chat_events,
            transcript_events,
        }
    }

    /// Submit a user message and wait for the loop to accept or refuse it.
    pub async fn submit(&self, text: impl Into<String>) -> Result<SubmitOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.send(Command::Submit {
            text: text.into(),
            reply: Some(reply),
        })?;
        outcome.await.map_err(|_| Error::Closed)?
    }

    /// Abort the in-flight round, including a pending session creation.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Tear the conversation down to the greeting.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Current transcript entries, seed included.
    pub async fn entries(&self) -> Result<Vec<ConversationEntry>> {
        let (reply, entries) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        entries.await.map_err(|_| Error::Closed)
    }

    /// Stop the loop. The spawned task then yields the final transcript.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Closed)
    }

    /// The busy/idle flag for the input surface.
    pub fn activity(&self) -> &ActivitySignal {
        &self.activity
    }

    /// Whether a reply is in progress.
    pub fn is_busy(&self) -> bool {
        self.activity.is_busy()
    }

    /// Subscribe to round events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.chat_events.subscribe()
    }

    /// Subscribe to transcript mutations.
    pub fn subscribe_transcript(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_events.subscribe()
    }

    /// Wait until no reply is in progress.
    pub async fn wait_for_idle(&self) {
        self.activity.wait_for_idle().await;
    }

    /// Wait until idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: Duration) -> bool {
        self.activity.wait_for_idle_timeout(timeout).await
    }
}
