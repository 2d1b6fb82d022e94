//! Core wire types shared by the client and the session state machine

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Who wrote a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Author {
    #[default]
    Agent,
    User,
}

impl Author {
    /// Get a human-readable label for this author
    pub fn label(&self) -> &'static str {
        match self {
            Author::Agent => "agent",
            Author::User => "you",
        }
    }
}

// The backend encodes the enum by ordinal (AGENT = 0, USER = 1) while newer
// deployments send the names, so accept both.
impl<'de> Deserialize<'de> for Author {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Ordinal(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => match name.to_ascii_uppercase().as_str() {
                "AGENT" => Ok(Author::Agent),
                "USER" => Ok(Author::User),
                _ => Err(de::Error::unknown_variant(&name, &["AGENT", "USER"])),
            },
            Repr::Ordinal(0) => Ok(Author::Agent),
            Repr::Ordinal(1) => Ok(Author::User),
            Repr::Ordinal(n) => Err(de::Error::custom(format!("unknown author ordinal: {}", n))),
        }
    }
}

/// One turn of the conversation as it travels over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub content: String,
    pub author: Author,
    /// Retrieval context the backend attached to an answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatEntry {
    /// Create a user-authored entry
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author: Author::User,
            context: None,
        }
    }

    /// Create an agent-authored entry
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author: Author::Agent,
            context: None,
        }
    }
}

/// A decoded server-pushed event
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Entry candidate carried by the event
    pub entry: ChatEntry,
    /// Content replaces the reply currently being streamed
    pub is_transient: bool,
    /// The streamed reply ends after this event is applied
    pub is_stop: bool,
}

impl StreamEvent {
    /// Create an event that updates the in-progress reply
    pub fn transient(content: impl Into<String>) -> Self {
        Self {
            entry: ChatEntry::agent(content),
            is_transient: true,
            is_stop: false,
        }
    }

    /// Create an event that appends (or finalizes) an agent entry
    pub fn entry(content: impl Into<String>) -> Self {
        Self {
            entry: ChatEntry::agent(content),
            is_transient: false,
            is_stop: false,
        }
    }

    /// Mark this event as the last one of the reply
    pub fn with_stop(mut self) -> Self {
        self.is_stop = true;
        self
    }

    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        self.is_stop
    }
}

/// Payload shape of one pushed message.
///
/// Flags may be absent or `null`; both mean `false`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireEvent {
    pub content: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub is_transient: Option<bool>,
    #[serde(default)]
    pub is_stop: Option<bool>,
}

impl From<WireEvent> for StreamEvent {
    fn from(wire: WireEvent) -> Self {
        Self {
            entry: ChatEntry {
                content: wire.content,
                author: wire.author,
                context: wire.context.filter(|c| !c.is_empty()),
            },
            is_transient: wire.is_transient.unwrap_or(false),
            is_stop: wire.is_stop.unwrap_or(false),
        }
    }
}

/// Opaque acknowledgement returned by session creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionAck(pub serde_json::Value);

/// Reply of the non-streaming query endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectReply {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<String>,
}
