//! Orchestrator: starts a reply round for each new user entry and drives the
//! stream listener until the round ends.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wikichat_api::{Author, ChatBackend};

use crate::{
    activity::ActivitySignal,
    error::{Error, Result},
    events::ChatEvent,
    handle::ChatHandle,
    listener::{CloseReason, DEFAULT_IDLE_TIMEOUT, Frame, Step, StreamListener},
    transcript::{ConversationEntry, DEFAULT_GREETING, Transcript},
};

/// How the agent's reply is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyMode {
    /// Session creation followed by a pushed, incremental reply
    #[default]
    Streaming,
    /// One query call answered in a single piece
    Direct,
}

/// What to do with a submission that arrives while a reply is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Refuse it with [`Error::Busy`]
    #[default]
    Reject,
    /// Hold it until the current round ends
    Queue,
    /// Cancel the current reply and start the new round
    CancelInFlight,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Synthetic first agent entry
    pub greeting: String,
    pub mode: ReplyMode,
    pub busy_policy: BusyPolicy,
    /// Longest allowed gap between two frames of a reply
    pub idle_timeout: Duration,
    /// Maximum number of held submissions under [`BusyPolicy::Queue`]
    pub max_queue: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            mode: ReplyMode::Streaming,
            busy_policy: BusyPolicy::Reject,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_queue: 16,
        }
    }
}

/// Result of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A round was started for it
    Started,
    /// It waits for the current round to end
    Queued,
}

/// Requests accepted by a running orchestrator loop
#[derive(Debug)]
pub enum Command {
    Submit {
        text: String,
        reply: Option<oneshot::Sender<Result<SubmitOutcome>>>,
    },
    Cancel,
    Reset,
    /// Copy of the current transcript entries
    Snapshot {
        reply: oneshot::Sender<Vec<ConversationEntry>>,
    },
    Shutdown,
}

enum Input {
    Command(Command),
    Frame(Frame),
    Disconnected,
}

/// Glue between the transcript, the backend and the stream listener
pub struct Orchestrator {
    config: OrchestratorConfig,
    transcript: Transcript,
    activity: ActivitySignal,
    listener: StreamListener,
    backend: Arc<dyn ChatBackend>,
    event_tx: broadcast::Sender<ChatEvent>,
    cancel: Arc<Mutex<CancellationToken>>,
    queue: VecDeque<String>,
    /// Index of the last user entry that started a round
    last_triggered: Option<usize>,
    round: Uuid,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(config: OrchestratorConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            transcript: Transcript::new(config.greeting.clone()),
            listener: StreamListener::new(config.idle_timeout),
            activity: ActivitySignal::new(),
            backend,
            event_tx,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            queue: VecDeque::new(),
            last_triggered: None,
            round: Uuid::nil(),
            config,
        }
    }

    /// Subscribe to round events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn activity(&self) -> &ActivitySignal {
        &self.activity
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn set_busy_policy(&mut self, policy: BusyPolicy) {
        self.config.busy_policy = policy;
    }

    /// Whether a reply stream is currently open
    pub fn is_streaming(&self) -> bool {
        self.listener.is_open()
    }

    /// Number of held submissions
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Cancel the in-flight round, if any
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Submit a user message.
    ///
    /// Appends the user entry and starts its round. In streaming mode this
    /// returns once the reply stream is open; drive it with
    /// [`Orchestrator::next_frame`] or [`Orchestrator::run_until_idle`].
    pub async fn submit(&mut self, text: &str) -> Result<SubmitOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyInput);
        }

        if self.activity.is_busy() {
            match self.config.busy_policy {
                BusyPolicy::Reject => {
                    tracing::debug!("Rejecting submission while busy");
                    return Err(Error::Busy);
                }
                BusyPolicy::Queue => {
                    self.enqueue(text.to_string());
                    return Ok(SubmitOutcome::Queued);
                }
                BusyPolicy::CancelInFlight => {
                    tracing::debug!("Cancelling in-flight reply for a new submission");
                    self.close_stream(CloseReason::Cancelled, true);
                    if self.activity.is_busy() {
                        return Err(Error::Busy);
                    }
                }
            }
        }

        let index = self.transcript.append(ConversationEntry::user(text))?;
        self.trigger(index).await?;
        Ok(SubmitOutcome::Started)
    }

    fn enqueue(&mut self, text: String) {
        if self.queue.len() >= self.config.max_queue {
            tracing::warn!(
                "Submission queue full ({} messages), dropping oldest",
                self.config.max_queue
            );
            self.queue.pop_front();
        }
        self.queue.push_back(text.clone());
        self.emit(ChatEvent::Queued {
            text,
            pending: self.queue.len(),
        });
    }

    /// Start the round for the user entry at `index`.
    ///
    /// Fires at most once per user entry and never while another round is
    /// in progress.
    pub(crate) async fn trigger(&mut self, index: usize) -> Result<()> {
        let is_user = self
            .transcript
            .entries()
            .get(index)
            .is_some_and(|e| e.author == Author::User);
        if !is_user || self.last_triggered == Some(index) {
            tracing::debug!("Entry {} does not start a round", index);
            return Ok(());
        }
        if !self.activity.try_begin() {
            tracing::warn!("Round already in progress; not starting another for entry {}", index);
            return Err(Error::Busy);
        }
        self.last_triggered = Some(index);
        self.start_round(index).await
    }

    async fn start_round(&mut self, user_index: usize) -> Result<()> {
        self.round = Uuid::new_v4();
        let cancel = {
            let mut token = self.cancel.lock();
            *token = CancellationToken::new();
            token.clone()
        };
        tracing::debug!("Round {} started for entry {}", self.round, user_index);
        self.emit(ChatEvent::RoundStart {
            round: self.round,
            user_index,
        });

        match self.config.mode {
            ReplyMode::Streaming => self.start_streaming(cancel).await,
            ReplyMode::Direct => {
                let question = self.transcript.entries()[user_index].content.clone();
                self.answer_directly(&question, cancel).await
            }
        }
    }

    async fn start_streaming(&mut self, cancel: CancellationToken) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let history = self.transcript.history();

        let created = tokio::select! {
            result = backend.create_session(&history) => result,
            _ = cancel.cancelled() => return self.fail_round(Error::Cancelled),
        };
        if let Err(e) = created {
            return self.fail_round(Error::InitiationFailed(e));
        }
        self.emit(ChatEvent::SessionCreated { round: self.round });

        let opened = tokio::select! {
            result = backend.open_stream() => result,
            _ = cancel.cancelled() => return self.fail_round(Error::Cancelled),
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => return self.fail_round(Error::StreamFailed(e.to_string())),
        };
        if let Err(e) = self.listener.arm(stream) {
            return self.fail_round(e);
        }
        self.emit(ChatEvent::StreamOpened { round: self.round });
        Ok(())
    }

    async fn answer_directly(&mut self, question: &str, cancel: CancellationToken) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let reply = tokio::select! {
            result = backend.ask(question) => result,
            _ = cancel.cancelled() => return self.fail_round(Error::Cancelled),
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => return self.fail_round(Error::InitiationFailed(e)),
        };

        let mut entry = ConversationEntry::agent(reply.response);
        if !reply.sources.is_empty() {
            entry.context = Some(reply.sources.join("\n"));
        }
        if let Err(e) = self.transcript.append(entry) {
            tracing::error!("Could not append direct reply: {}", e);
        }
        self.activity.clear();
        self.emit(ChatEvent::RoundEnd { round: self.round });
        Ok(())
    }

    /// End a round that failed before or instead of streaming.
    fn fail_round(&mut self, error: Error) -> Result<()> {
        tracing::warn!("Round {} failed: {}", self.round, error);
        self.transcript.seal_transient();
        self.append_notice(&error);
        self.activity.clear();
        self.emit(ChatEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
        self.emit(ChatEvent::RoundEnd { round: self.round });
        Err(error)
    }

    fn append_notice(&mut self, error: &Error) {
        let notice = ConversationEntry::error_notice(notice_text(error));
        if let Err(e) = self.transcript.append(notice) {
            tracing::error!("Could not append failure notice: {}", e);
        }
    }

    /// Wait for and apply the next frame of the open reply stream.
    /// Returns `None` when no stream is open.
    pub async fn next_frame(&mut self) -> Option<Step> {
        if !self.listener.is_open() {
            return None;
        }
        let cancel = self.cancel.lock().clone();
        let frame = tokio::select! {
            frame = self.listener.next_frame() => frame?,
            _ = cancel.cancelled() => Frame::Cancelled,
        };
        Some(self.handle_frame(frame))
    }

    fn handle_frame(&mut self, frame: Frame) -> Step {
        let step = self
            .listener
            .handle_frame(frame, &mut self.transcript, &self.activity);
        match &step {
            Step::Dropped(e) => {
                self.emit(ChatEvent::EventDropped {
                    round: self.round,
                    message: e.to_string(),
                });
            }
            Step::Closed(reason) => self.finish_round(reason.clone(), true),
            Step::Applied | Step::Ignored => {}
        }
        step
    }

    fn close_stream(&mut self, reason: CloseReason, notice: bool) {
        if !self.listener.is_open() {
            return;
        }
        let reason = self
            .listener
            .close(reason, &mut self.transcript, &self.activity);
        self.finish_round(reason, notice);
    }

    fn finish_round(&mut self, reason: CloseReason, notice: bool) {
        self.emit(ChatEvent::StreamClosed {
            round: self.round,
            reason: reason.clone(),
        });
        if let Some(error) = reason.to_error() {
            tracing::warn!("Round {} ended early: {}", self.round, error);
            if notice {
                self.append_notice(&error);
            }
            self.emit(ChatEvent::Error {
                kind: error.kind(),
                message: error.to_string(),
            });
        }
        self.emit(ChatEvent::RoundEnd { round: self.round });
    }

    /// Pump the open stream to the end, then run held submissions.
    pub async fn run_until_idle(&mut self) {
        loop {
            while self.next_frame().await.is_some() {}
            if !self.start_queued().await {
                break;
            }
        }
    }

    /// Start the next held submission. Returns `false` when none is left.
    async fn start_queued(&mut self) -> bool {
        while let Some(text) = self.queue.pop_front() {
            match self.submit(&text).await {
                Ok(_) => return true,
                Err(e) => tracing::warn!("Queued submission failed: {}", e),
            }
        }
        false
    }

    /// Tear the conversation down to the greeting
    pub fn reset(&mut self) {
        self.close_stream(CloseReason::Cancelled, false);
        self.queue.clear();
        self.activity.clear();
        self.transcript.reset();
        self.last_triggered = None;
    }

    /// Spawn the orchestrator as a task and return a handle to it.
    /// The task yields the final transcript on shutdown.
    pub fn spawn(self) -> (ChatHandle, tokio::task::JoinHandle<Transcript>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ChatHandle::new(
            tx,
            Arc::clone(&self.cancel),
            self.activity.clone(),
            self.event_tx.clone(),
            self.transcript.sender(),
        );
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Cooperative event loop: commands and stream frames are handled one at
    /// a time, in arrival order.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> Transcript {
        loop {
            let open = self.listener.is_open();
            let cancel = self.cancel.lock().clone();
            let input = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => Input::Disconnected,
                },
                Some(frame) = self.listener.next_frame(), if open => Input::Frame(frame),
                _ = cancel.cancelled(), if open => Input::Frame(Frame::Cancelled),
            };

            match input {
                Input::Frame(frame) => {
                    if let Step::Closed(_) = self.handle_frame(frame) {
                        self.start_queued().await;
                    }
                }
                Input::Command(Command::Submit { text, reply }) => {
                    let result = self.submit(&text).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                    if !self.activity.is_busy() {
                        self.start_queued().await;
                    }
                }
                Input::Command(Command::Cancel) => {
                    self.close_stream(CloseReason::Cancelled, true);
                    self.start_queued().await;
                }
                Input::Command(Command::Reset) => self.reset(),
                Input::Command(Command::Snapshot { reply }) => {
                    let _ = reply.send(self.transcript.entries().to_vec());
                }
                Input::Command(Command::Shutdown) | Input::Disconnected => {
                    self.close_stream(CloseReason::Cancelled, false);
                    break;
                }
            }
        }
        tracing::debug!("Session loop stopped");
        self.transcript
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Text of the failure notice shown in the transcript
fn notice_text(error: &Error) -> String {
    match error {
        Error::InitiationFailed(e) => format!("Sorry, I couldn't reach the server ({}).", e),
        Error::StreamFailed(_) => "Sorry, the reply was cut off. Please try again.".to_string(),
        Error::StreamTimedOut(after) => format!(
            "Sorry, no reply arrived for {} seconds. Please try again.",
            after.as_secs()
        ),
        Error::Cancelled => "Reply cancelled.".to_string(),
        other => format!("Something went wrong: {}", other),
    }
}
