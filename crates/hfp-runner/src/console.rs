//! Line commands typed on stdin.

use crate::error::{Result, RunnerError};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Dial(String),
    Answer,
    HangUp,
    Audio(bool),
    Calls,
    Disconnect,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<ConsoleCommand>> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let command = match head.to_ascii_lowercase().as_str() {
            "dial" => {
                let number = words.next().ok_or(RunnerError::Usage("dial <number>"))?;
                ConsoleCommand::Dial(number.to_string())
            }
            "answer" => ConsoleCommand::Answer,
            "hangup" => ConsoleCommand::HangUp,
            "audio" => match words.next() {
                Some("on") => ConsoleCommand::Audio(true),
                Some("off") => ConsoleCommand::Audio(false),
                _ => return Err(RunnerError::Usage("audio on|off")),
            },
            "calls" => ConsoleCommand::Calls,
            "disconnect" => ConsoleCommand::Disconnect,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(RunnerError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

pub const HELP: &str = "commands: dial <number>, answer, hangup, audio on|off, calls, disconnect, quit";
