//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing the player to control the session without talking to the NPC.

use crate::prompt::Difficulty;
use crate::settings::ModelTier;

/// A parsed chat command.
///
/// These commands control the session and are never sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Forget the conversation and start over.
    Reset,

    /// Show the model server, or switch to another.
    Host(Option<String>),

    /// Choose the small or large model.
    Tier(ModelTier),

    /// Pick the subject the NPC teaches.
    Subject(usize),

    /// Override the difficulty the NPC pitches at.
    Difficulty(Difficulty),

    /// Show what the NPC knows about the player's progress.
    Progress,

    /// Print the conversation so far.
    History,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

impl ChatCommand {
    /// True for commands after which the NPC starts a fresh conversation.
    pub fn resets_conversation(&self) -> bool {
        matches!(self, ChatCommand::Reset | ChatCommand::Subject(_))
    }
}

/// Parses player input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be said to the NPC.
///
/// # Examples
///
/// ```
/// # use colloquy::commands::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("/tier large").is_some());
/// assert!(parse_command("Hello, Mira!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "reset" | "clear" => ChatCommand::Reset,
        "host" => ChatCommand::Host(argument.map(|s| s.to_string())),
        "tier" => match argument.map(str::parse::<ModelTier>) {
            Some(Ok(tier)) => ChatCommand::Tier(tier),
            Some(Err(_)) | None => {
                ChatCommand::Invalid("/tier expects 'small' or 'large'".to_string())
            }
        },
        "subject" => match argument.map(str::parse::<usize>) {
            Some(Ok(index)) => ChatCommand::Subject(index),
            Some(Err(_)) => {
                ChatCommand::Invalid("/subject expects a non-negative integer".to_string())
            }
            None => ChatCommand::Invalid("/subject requires a value".to_string()),
        },
        "difficulty" => match argument.map(str::parse::<Difficulty>) {
            Some(Ok(level)) => ChatCommand::Difficulty(level),
            Some(Err(err)) => ChatCommand::Invalid(format!("/difficulty: {err}")),
            None => ChatCommand::Invalid(
                "/difficulty requires beginner, intermediate, or advanced".to_string(),
            ),
        },
        "progress" => ChatCommand::Progress,
        "history" => ChatCommand::History,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /reset                 Forget the conversation and start over
  /host [url]            Show or change the model server
  /tier small|large      Choose the small or large model
  /subject <n>           Pick the subject to study (starts over)
  /difficulty <level>    Set beginner, intermediate, or advanced
  /progress              Show topics mastered so far
  /history               Print the conversation so far
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl-C while the NPC is answering to interrupt it."#
}
