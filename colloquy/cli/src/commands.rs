//! Input line parsing
//!
//! A line starting with `/` is a command; anything else is sent as a message.

use std::path::PathBuf;

/// One line of user input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Send the text as a message
    Send(String),
    /// Blank line
    Empty,
    /// Queue a file
    Attach(PathBuf),
    /// Drop a queued attachment by ID prefix or name
    Detach(String),
    /// List queued attachments
    Attachments,
    /// Stop the in-flight response
    Stop,
    /// Start over
    New,
    /// Print the conversation
    History,
    /// Print help
    Help,
    /// Exit
    Quit,
    /// Unrecognized or malformed command
    Invalid(String),
}

/// Help text for the interactive prompt
pub const HELP: &str = "\
Type a message and press Enter to send it.

Commands:
  /attach <path>       queue a file for the next message
  /detach <id|name>    remove a queued file
  /attachments         list queued files
  /stop                stop the response in progress (or press Ctrl-C)
  /new                 start a new chat
  /history             show the conversation
  /help                show this help
  /quit                exit

An empty line sends the suggested prompt, if there is one.";

/// Parse one input line
#[must_use]
pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Send(line.trim_end().to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match (name, arg.is_empty()) {
        ("attach", false) => Command::Attach(PathBuf::from(arg)),
        ("attach", true) => Command::Invalid("usage: /attach <path>".to_string()),
        ("detach", false) => Command::Detach(arg.to_string()),
        ("detach", true) => Command::Invalid("usage: /detach <id|name>".to_string()),
        ("attachments", _) => Command::Attachments,
        ("stop", _) => Command::Stop,
        ("new", _) => Command::New,
        ("history", _) => Command::History,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Invalid(format!("unknown command '/{name}', try /help")),
    }
}
