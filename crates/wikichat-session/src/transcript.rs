//! Transcript store: the ordered conversation log.
//!
//! Entries are only ever appended. The single exception is the last entry
//! while it is transient: its content may be replaced, and it is then
//! finalized in place. Every mutation is broadcast to subscribers in the
//! order it happened.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use wikichat_api::{Author, ChatEntry};

use crate::error::{Error, Result};

/// Greeting the transcript is seeded with
pub const DEFAULT_GREETING: &str = "Hi there, how can I help?";

/// One entry of the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub content: String,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Content may still be replaced by a later event of the same reply
    #[serde(default)]
    pub is_transient: bool,
    /// Client-side failure notice, never sent to the backend
    #[serde(default)]
    pub is_error: bool,
    pub timestamp: i64,
}

impl ConversationEntry {
    fn new(author: Author, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author,
            context: None,
            is_transient: false,
            is_error: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a user-authored entry
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Author::User, content)
    }

    /// Create a final agent-authored entry
    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Author::Agent, content)
    }

    /// Create an agent-authored failure notice
    pub fn error_notice(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(Author::Agent, content)
        }
    }

    /// Mark this entry as transient
    pub fn into_transient(mut self) -> Self {
        self.is_transient = true;
        self
    }

    /// Wire shape of this entry
    pub fn to_chat_entry(&self) -> ChatEntry {
        ChatEntry {
            content: self.content.clone(),
            author: self.author,
            context: self.context.clone(),
        }
    }
}

impl From<ChatEntry> for ConversationEntry {
    fn from(entry: ChatEntry) -> Self {
        Self {
            context: entry.context,
            ..Self::new(entry.author, entry.content)
        }
    }
}

/// Notifications emitted for every transcript mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEvent {
    /// An entry was added at `index`
    Appended {
        index: usize,
        entry: ConversationEntry,
    },
    /// The transient entry at `index` got new content
    ContentReplaced { index: usize, content: String },
    /// The transient entry at `index` became final
    Finalized { index: usize, content: String },
    /// The whole transcript was torn down back to the greeting
    Reset { greeting: ConversationEntry },
}

/// Ordered, append-only conversation log
#[derive(Debug)]
pub struct Transcript {
    greeting: String,
    entries: Vec<ConversationEntry>,
    event_tx: broadcast::Sender<TranscriptEvent>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}

impl Transcript {
    /// Create a transcript seeded with a synthetic agent greeting
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        let (event_tx, _) = broadcast::channel(256);
        Self {
            entries: vec![ConversationEntry::agent(greeting.clone())],
            greeting,
            event_tx,
        }
    }

    /// Subscribe to mutation notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<TranscriptEvent> {
        self.event_tx.clone()
    }

    /// All entries, greeting first
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Peek at the most recent entry
    pub fn last_entry(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }

    /// Whether the last entry is still being streamed into
    pub fn has_transient(&self) -> bool {
        self.last_entry().is_some_and(|e| e.is_transient)
    }

    /// The conversation as sent to the backend: real turns only, without the
    /// greeting and without local failure notices.
    pub fn history(&self) -> Vec<ChatEntry> {
        self.entries
            .iter()
            .skip(1)
            .filter(|e| !e.is_error)
            .map(ConversationEntry::to_chat_entry)
            .collect()
    }

    /// Add an entry at the end. Returns its index.
    pub fn append(&mut self, entry: ConversationEntry) -> Result<usize> {
        if self.has_transient() {
            return Err(Error::InvariantViolation(
                "cannot append while the last entry is transient".to_string(),
            ));
        }
        if entry.is_transient && entry.author != Author::Agent {
            return Err(Error::InvariantViolation(
                "only agent entries can be transient".to_string(),
            ));
        }
        let index = self.entries.len();
        self.entries.push(entry.clone());
        self.notify(TranscriptEvent::Appended { index, entry });
        Ok(index)
    }

    /// Replace the content of the last entry, keeping its author and flags
    pub fn replace_last_content(&mut self, content: impl Into<String>) -> Result<()> {
        let index = self
            .entries
            .len()
            .checked_sub(1)
            .ok_or(Error::PreconditionFailed("replace on an empty transcript"))?;
        let content = content.into();
        self.entries[index].content = content.clone();
        self.notify(TranscriptEvent::ContentReplaced { index, content });
        Ok(())
    }

    /// Resolve the transient last entry to final, optionally with new content
    /// and context.
    pub fn finalize_last(
        &mut self,
        content: Option<String>,
        context: Option<String>,
    ) -> Result<usize> {
        let index = self
            .entries
            .len()
            .checked_sub(1)
            .ok_or(Error::PreconditionFailed("finalize on an empty transcript"))?;
        let entry = &mut self.entries[index];
        if !entry.is_transient {
            return Err(Error::PreconditionFailed("last entry is not transient"));
        }
        if let Some(content) = content {
            entry.content = content;
        }
        if context.is_some() {
            entry.context = context;
        }
        entry.is_transient = false;
        let content = entry.content.clone();
        self.notify(TranscriptEvent::Finalized { index, content });
        Ok(index)
    }

    /// Finalize a dangling transient entry without touching its content.
    /// Returns the index of the sealed entry, if there was one.
    pub fn seal_transient(&mut self) -> Option<usize> {
        if !self.has_transient() {
            return None;
        }
        self.finalize_last(None, None).ok()
    }

    /// Tear the whole transcript down to a fresh greeting
    pub fn reset(&mut self) {
        let greeting = ConversationEntry::agent(self.greeting.clone());
        self.entries = vec![greeting.clone()];
        self.notify(TranscriptEvent::Reset { greeting });
    }

    fn notify(&self, event: TranscriptEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}
