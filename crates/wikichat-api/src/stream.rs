//! Server-push reply stream and per-event decoding

use crate::error::{Error, Result};
use crate::types::{StreamEvent, WireEvent};
use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use std::pin::Pin;
use tokio_stream::Stream;

/// A stream of decoded reply events.
///
/// `Err(Error::Decode { .. })` items mark a single malformed message and the
/// stream keeps going. Any other error is the final item. Dropping the
/// stream closes the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Decode one pushed message payload
pub fn decode_event(data: &str) -> Result<StreamEvent> {
    serde_json::from_str::<WireEvent>(data)
        .map(StreamEvent::from)
        .map_err(|source| Error::Decode {
            data: data.to_string(),
            source,
        })
}

/// Create the event stream from SSE events
pub(crate) fn create_stream(mut event_source: EventSource) -> impl Stream<Item = Result<StreamEvent>> {
    stream! {
        while let Some(event_result) = event_source.next().await {
            match event_result {
                Ok(Event::Open) => {
                    tracing::debug!("Reply stream opened");
                }
                Ok(Event::Message(message)) => {
                    if !message.event.is_empty() && message.event != "message" {
                        tracing::debug!("Ignoring SSE event type: {}", message.event);
                        continue;
                    }
                    yield decode_event(&message.data);
                }
                Err(e) => {
                    // Never reconnect: a cut-off reply is reported instead.
                    event_source.close();
                    yield Err(map_sse_error(e));
                    break;
                }
            }
        }
    }
}

fn map_sse_error(error: reqwest_eventsource::Error) -> Error {
    use reqwest_eventsource::Error as SseError;

    match error {
        SseError::StreamEnded => Error::Sse("stream ended before the reply finished".into()),
        SseError::InvalidStatusCode(status, _) => {
            Error::api(status.as_u16(), "reply stream rejected")
        }
        SseError::InvalidContentType(content_type, _) => Error::UnexpectedResponse(format!(
            "expected text/event-stream, got {:?}",
            content_type
        )),
        SseError::Transport(e) => Error::Http(e),
        other => Error::Sse(other.to_string()),
    }
}
