//! Scripted chat backend for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use wikichat_api::{
    ChatBackend, ChatEntry, DirectReply, Error, EventStream, Result, SessionAck, StreamEvent,
};

/// Sender side of a live scripted stream
pub(crate) type StreamFeed = mpsc::UnboundedSender<Result<StreamEvent>>;

#[derive(Default)]
pub(crate) struct MockBackend {
    sessions: AtomicU32,
    histories: Mutex<Vec<Vec<ChatEntry>>>,
    session_failures: Mutex<VecDeque<Error>>,
    streams: Mutex<VecDeque<EventStream>>,
    replies: Mutex<VecDeque<Result<DirectReply>>>,
    questions: Mutex<Vec<String>>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a stream that yields `items` and then ends.
    pub(crate) fn with_stream(self, items: Vec<Result<StreamEvent>>) -> Self {
        self.streams.lock().push_back(Box::pin(futures::stream::iter(items)));
        self
    }

    /// Queue a stream that stays open until the returned feed is dropped.
    pub(crate) fn live_stream(&self) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .push_back(Box::pin(UnboundedReceiverStream::new(rx)));
        tx
    }

    /// Make the next session creation fail.
    pub(crate) fn fail_next_session(self, error: Error) -> Self {
        self.session_failures.lock().push_back(error);
        self
    }

    pub(crate) fn with_reply(self, reply: Result<DirectReply>) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    pub(crate) fn session_calls(&self) -> u32 {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn histories(&self) -> Vec<Vec<ChatEntry>> {
        self.histories.lock().clone()
    }

    pub(crate) fn questions(&self) -> Vec<String> {
        self.questions.lock().clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn create_session(&self, history: &[ChatEntry]) -> Result<SessionAck> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().push(history.to_vec());
        if let Some(error) = self.session_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(SessionAck(serde_json::json!({"success": true})))
    }

    async fn open_stream(&self) -> Result<EventStream> {
        self.streams
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Sse("no scripted stream".into()))
    }

    async fn ask(&self, question: &str) -> Result<DirectReply> {
        self.questions.lock().push(question.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::api(404, "no scripted reply")))
    }
}
