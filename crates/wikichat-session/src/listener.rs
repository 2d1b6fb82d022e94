//! Stream listener: owns the push-stream connection for one reply.
//!
//! The listener is either `Closed` or `Open` with the live stream as an
//! owned resource. Every exit from `Open` goes through [`StreamListener::close`],
//! which drops the stream, seals any transient entry and clears the
//! activity signal.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use wikichat_api::{Author, EventStream, StreamEvent};

use crate::{
    activity::ActivitySignal,
    error::{Error, Result},
    transcript::{ConversationEntry, Transcript},
};

/// Default time allowed between two frames of a reply
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Stand-in deadline for timeouts too large to represent
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Why a reply stream closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseReason {
    /// The terminal event arrived
    Completed,
    /// The transport broke or ended early
    Failed { message: String },
    /// No frame within the idle timeout
    TimedOut { after_ms: u64 },
    /// Cancelled or torn down from outside
    Cancelled,
}

impl CloseReason {
    /// The error a non-completed close maps to
    pub fn to_error(&self) -> Option<Error> {
        match self {
            CloseReason::Completed => None,
            CloseReason::Failed { message } => Some(Error::StreamFailed(message.clone())),
            CloseReason::TimedOut { after_ms } => {
                Some(Error::StreamTimedOut(Duration::from_millis(*after_ms)))
            }
            CloseReason::Cancelled => Some(Error::Cancelled),
        }
    }
}

/// One input to the listener
#[derive(Debug)]
pub enum Frame {
    /// An item pulled from the stream
    Event(wikichat_api::Result<StreamEvent>),
    /// The stream ran out of items
    Ended,
    /// Nothing arrived within the idle timeout
    IdleTimeout,
    /// The round was cancelled
    Cancelled,
}

/// What handling a frame did
#[derive(Debug)]
pub enum Step {
    /// The event was applied to the transcript
    Applied,
    /// A malformed event was dropped; the stream stays open
    Dropped(Error),
    /// The stream closed
    Closed(CloseReason),
    /// The listener was already closed
    Ignored,
}

struct ActiveStream {
    stream: EventStream,
    opened_at: Instant,
    /// When the stream counts as idle; moves forward with every item
    deadline: Instant,
    applied: usize,
}

/// Listener lifecycle state
enum ListenerState {
    Closed,
    Open(ActiveStream),
}

/// Turns pushed events into transcript mutations
pub struct StreamListener {
    state: ListenerState,
    idle_timeout: Duration,
}

impl Default for StreamListener {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl StreamListener {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            state: ListenerState::Closed,
            idle_timeout,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ListenerState::Open(_))
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Take ownership of a freshly opened stream. Only one live stream is
    /// allowed: a second one is rejected and dropped, which closes it.
    pub fn arm(&mut self, stream: EventStream) -> Result<()> {
        if self.is_open() {
            tracing::warn!("Rejecting a second reply stream while one is open");
            return Err(Error::StreamAlreadyOpen);
        }
        tracing::debug!("Reply stream armed");
        self.state = ListenerState::Open(ActiveStream {
            stream,
            opened_at: Instant::now(),
            deadline: deadline_after(self.idle_timeout),
            applied: 0,
        });
        Ok(())
    }

    /// Wait for the next frame. Returns `None` when closed.
    ///
    /// The idle deadline only moves when an item arrives, so abandoning this
    /// future and calling again does not restart the timeout.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let idle_timeout = self.idle_timeout;
        let ListenerState::Open(active) = &mut self.state else {
            return None;
        };
        let frame = match tokio::time::timeout_at(active.deadline, active.stream.next()).await {
            Ok(Some(item)) => {
                active.deadline = deadline_after(idle_timeout);
                Frame::Event(item)
            }
            Ok(None) => Frame::Ended,
            Err(_) => Frame::IdleTimeout,
        };
        Some(frame)
    }

    /// Apply one frame to the transcript.
    pub fn handle_frame(
        &mut self,
        frame: Frame,
        transcript: &mut Transcript,
        activity: &ActivitySignal,
    ) -> Step {
        let ListenerState::Open(active) = &mut self.state else {
            tracing::debug!("Ignoring {:?} on a closed listener", frame);
            return Step::Ignored;
        };

        match frame {
            Frame::Event(Ok(event)) => {
                active.applied += 1;
                apply_event(&event, transcript);
                if event.is_stop {
                    Step::Closed(self.close(CloseReason::Completed, transcript, activity))
                } else {
                    Step::Applied
                }
            }
            Frame::Event(Err(e)) if e.is_decode() => {
                tracing::warn!("Dropping malformed reply event: {}", e);
                Step::Dropped(Error::DecodeFailed(e))
            }
            Frame::Event(Err(e)) => {
                let reason = CloseReason::Failed {
                    message: e.to_string(),
                };
                Step::Closed(self.close(reason, transcript, activity))
            }
            Frame::Ended => {
                let reason = CloseReason::Failed {
                    message: "stream ended before the reply finished".to_string(),
                };
                Step::Closed(self.close(reason, transcript, activity))
            }
            Frame::IdleTimeout => {
                let reason = CloseReason::TimedOut {
                    after_ms: u64::try_from(self.idle_timeout.as_millis()).unwrap_or(u64::MAX),
                };
                Step::Closed(self.close(reason, transcript, activity))
            }
            Frame::Cancelled => Step::Closed(self.close(CloseReason::Cancelled, transcript, activity)),
        }
    }

    /// Close the stream: drop the connection, seal any transient entry and
    /// clear the activity signal. Closing a closed listener only clears the
    /// signal.
    pub fn close(
        &mut self,
        reason: CloseReason,
        transcript: &mut Transcript,
        activity: &ActivitySignal,
    ) -> CloseReason {
        if let ListenerState::Open(active) =
            std::mem::replace(&mut self.state, ListenerState::Closed)
        {
            tracing::debug!(
                "Reply stream closed ({:?}) after {} events in {:?}",
                reason,
                active.applied,
                active.opened_at.elapsed()
            );
            drop(active.stream);
        }
        if let Some(index) = transcript.seal_transient() {
            tracing::debug!("Sealed transient entry {}", index);
        }
        activity.clear();
        reason
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Merge one event into the transcript.
///
/// A transient event updates the reply slot, opening one if the last entry
/// is final. A final event resolves an open slot, or appends when there is
/// none.
///
/// Everything pushed on the reply stream is the agent's, whatever author the
/// payload names.
fn apply_event(event: &StreamEvent, transcript: &mut Transcript) {
    let entry = &event.entry;
    if entry.author != Author::Agent {
        tracing::warn!("Reply event claims author {:?}; storing it as the agent's", entry.author);
    }
    let reply = || {
        let mut reply = ConversationEntry::from(entry.clone());
        reply.author = Author::Agent;
        reply
    };
    let result = match (event.is_transient, transcript.has_transient()) {
        (true, true) => transcript.replace_last_content(entry.content.clone()),
        (true, false) => transcript.append(reply().into_transient()).map(drop),
        (false, true) => transcript
            .finalize_last(Some(entry.content.clone()), entry.context.clone())
            .map(drop),
        (false, false) => transcript.append(reply()).map(drop),
    };

    if let Err(e) = result {
        tracing::error!("Skipping reply event: {}", e);
        debug_assert!(false, "transcript rejected a reply event: {}", e);
    }
}
