//! Slash commands for interactive mode

use wikichat_session::ConversationEntry;

use crate::utils::truncate_chars;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Start a fresh conversation
    Clear,
    /// Abort the reply in progress
    Cancel,
    /// List the conversation so far
    History,
    /// Show a message to the user (not sent to the agent)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();
    let command = input.strip_prefix('/')?;
    let command = command
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "cancel" | "stop" => CommandResult::Cancel,

        "history" | "hist" => CommandResult::History,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

/// Render the transcript for `/history`
pub fn history_text(entries: &[ConversationEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let tag = if entry.is_error {
                "error"
            } else if entry.is_transient {
                "typing"
            } else {
                entry.author.label()
            };
            let preview = truncate_chars(&entry.content, 70).replace('\n', " ");
            format!("  {}: [{}] {}", i, tag, preview)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /cancel, /stop       Abort the reply in progress
  /history             List the conversation so far
  /clear, /c           Start a fresh conversation
  /quit, /exit, /q     Exit wikichat

Anything else is sent to the agent. Ctrl-C cancels a reply in progress."#
        .to_string()
}
