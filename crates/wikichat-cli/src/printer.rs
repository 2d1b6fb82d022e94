//! Plain-text rendering of transcript notifications

use std::io::{self, Write};
use tokio::sync::broadcast;
use wikichat_api::Author;
use wikichat_session::TranscriptEvent;

use crate::utils::overwrite_line;

/// Turns transcript notifications into terminal output.
///
/// On a terminal the reply in progress is redrawn in place; otherwise only
/// settled entries are written so piped output stays clean.
pub struct Printer {
    is_tty: bool,
    show_user: bool,
    /// Text of the transient entry currently on screen
    open: Option<String>,
}

impl Printer {
    pub fn new(is_tty: bool, show_user: bool) -> Self {
        Self {
            is_tty,
            show_user,
            open: None,
        }
    }

    /// Output for one notification
    pub fn render(&mut self, event: &TranscriptEvent) -> String {
        match event {
            TranscriptEvent::Appended { entry, .. } => {
                let mut out = self.close_open(None);
                if entry.author == Author::User {
                    if self.show_user {
                        out.push_str(&format!("you> {}\n", entry.content));
                    }
                } else if entry.is_transient {
                    if self.is_tty {
                        out.push_str(&entry.content);
                    }
                    self.open = Some(entry.content.clone());
                } else if entry.is_error {
                    out.push_str(&format!("[{}]\n", entry.content));
                } else {
                    out.push_str(&format!("{}\n", entry.content));
                }
                out
            }
            TranscriptEvent::ContentReplaced { content, .. } => match self.open.as_mut() {
                Some(shown) => {
                    let out = if self.is_tty {
                        overwrite_line(shown, content)
                    } else {
                        String::new()
                    };
                    *shown = content.clone();
                    out
                }
                None => String::new(),
            },
            TranscriptEvent::Finalized { content, .. } => {
                if self.open.is_some() {
                    self.close_open(Some(content))
                } else {
                    format!("{}\n", content)
                }
            }
            TranscriptEvent::Reset { greeting } => {
                self.open = None;
                format!("{}\n", greeting.content)
            }
        }
    }

    /// Finish the line of the transient entry on screen, if any
    fn close_open(&mut self, content: Option<&str>) -> String {
        let Some(shown) = self.open.take() else {
            return String::new();
        };
        let content = content.unwrap_or(&shown);
        if self.is_tty {
            format!("{}\n", overwrite_line(&shown, content))
        } else {
            format!("{}\n", content)
        }
    }

    /// Print notifications until the transcript goes away
    pub async fn run(mut self, mut receiver: broadcast::Receiver<TranscriptEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    print!("{}", self.render(&event));
                    io::stdout().flush().ok();
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Printer fell behind, skipped {} updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
