//! HTTP client for the chat backend

use crate::{
    error::{Error, Result},
    stream::{EventStream, create_stream},
    types::{ChatEntry, DirectReply, SessionAck},
};
use async_trait::async_trait;
use reqwest::Url;
use reqwest_eventsource::EventSource;

/// Default backend address
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Trait for chat backends
///
/// The session state machine only talks to this trait, so tests can drive it
/// with scripted replies.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Hand the conversation so far to the backend and prepare a streamed reply
    async fn create_session(&self, history: &[ChatEntry]) -> Result<SessionAck>;

    /// Open the push stream carrying the reply for the last created session
    async fn open_stream(&self) -> Result<EventStream>;

    /// Ask a single question without streaming
    async fn ask(&self, question: &str) -> Result<DirectReply>;
}

/// Backend endpoint locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base_url: String,
    pub create_session_path: String,
    pub stream_path: String,
    pub query_path: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Endpoints {
    /// Endpoints rooted at `base_url` with the standard paths
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            create_session_path: "/create_streaming_chat/".to_string(),
            stream_path: "/get_streaming_chat_response".to_string(),
            query_path: "/query/".to_string(),
        }
    }

    /// Resolve `path` under the base URL, keeping any path prefix the base
    /// carries (`http://host/api` + `/query/` is `http://host/api/query/`).
    fn url(&self, path: &str) -> Result<Url> {
        let mut base = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidConfig(format!("invalid base URL {}: {}", self.base_url, e)))?;
        if !base.path().ends_with('/') {
            let prefixed = format!("{}/", base.path());
            base.set_path(&prefixed);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| Error::InvalidConfig(format!("invalid path {}: {}", path, e)))
    }

    /// URL of the session-creation endpoint
    pub fn create_session_url(&self) -> Result<Url> {
        self.url(&self.create_session_path)
    }

    /// URL of the reply stream endpoint
    pub fn stream_url(&self) -> Result<Url> {
        self.url(&self.stream_path)
    }

    /// URL of the non-streaming query endpoint for `question`
    pub fn query_url(&self, question: &str) -> Result<Url> {
        let mut url = self.url(&self.query_path)?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidConfig(format!("cannot append to {}", self.base_url)))?
            .pop_if_empty()
            .push(question);
        Ok(url)
    }
}

/// Chat backend reached over HTTP
pub struct ChatClient {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl ChatClient {
    /// Create a new client.
    ///
    /// The client keeps a cookie jar: the backend ties the reply stream to
    /// the session through a cookie set by session creation.
    pub fn new(endpoints: Endpoints) -> Result<Self> {
        // Fail early on a base URL that cannot be joined.
        endpoints.stream_url()?;
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { client, endpoints })
    }

    /// Get the configured endpoints
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn create_session(&self, history: &[ChatEntry]) -> Result<SessionAck> {
        let url = self.endpoints.create_session_url()?;
        tracing::debug!("Creating session at {} with {} entries", url, history.len());

        let response = self.client.post(url).json(history).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;

        // Only success matters; keep whatever came back for logging.
        let ack = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        tracing::debug!("Session acknowledged: {}", ack);
        Ok(SessionAck(ack))
    }

    async fn open_stream(&self) -> Result<EventStream> {
        let url = self.endpoints.stream_url()?;
        tracing::debug!("Opening reply stream at {}", url);

        let event_source = EventSource::new(self.client.get(url))
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }

    async fn ask(&self, question: &str) -> Result<DirectReply> {
        let url = self.endpoints.query_url(question)?;
        tracing::debug!("Querying {}", url);

        let response = self.client.get(url).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        let reply = serde_json::from_str::<DirectReply>(&body)?;
        Ok(reply)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        message
    };
    Err(Error::api(status.as_u16(), message))
}
