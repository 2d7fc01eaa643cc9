//! Error types for the HF engine.

use std::time::Duration;

use hfp_at_protocol::{AtCommandId, AtError, ResultCode};
use thiserror::Error;

use crate::types::DeviceAddress;

/// Errors that can occur in the HF engine.
#[derive(Debug, Error)]
pub enum HfError {
    /// The AG answered a command with an error result code.
    #[error("AG rejected {command}: {kind}")]
    Command {
        /// Command that failed.
        command: AtCommandId,
        /// Result code reported by the AG.
        kind: CommandErrorKind,
    },

    /// No reply within the response budget.
    #[error("no reply to {command} within {after:?}")]
    Timeout {
        /// Command that was in flight.
        command: AtCommandId,
        /// Response budget that elapsed.
        after: Duration,
    },

    /// The transport collaborator failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The audio collaborator failed.
    #[error("audio link error: {0}")]
    Audio(String),

    /// The device has no service level connection.
    #[error("device {0} is not connected")]
    NotConnected(DeviceAddress),

    /// No session exists for the device.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceAddress),

    /// A parameter was rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The local or remote side lacks the required feature.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Malformed data from the AG.
    #[error("protocol error: {0}")]
    Protocol(#[from] AtError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML decoding error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Error result codes the AG can close a command with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// `ERROR`
    Error,
    /// `+CME ERROR: <n>`
    Cme(u16),
    /// `BUSY`
    Busy,
    /// `NO CARRIER`
    NoCarrier,
    /// `NO ANSWER`
    NoAnswer,
    /// `BLOCKLISTED`
    Blocklisted,
    /// `DELAYED`
    Delayed,
}

impl CommandErrorKind {
    /// Map a result code to an error kind; `OK` maps to `None`.
    pub fn from_result_code(code: ResultCode) -> Option<CommandErrorKind> {
        match code {
            ResultCode::Ok => None,
            ResultCode::Error => Some(CommandErrorKind::Error),
            ResultCode::CmeError(n) => Some(CommandErrorKind::Cme(n)),
            ResultCode::Busy => Some(CommandErrorKind::Busy),
            ResultCode::NoCarrier => Some(CommandErrorKind::NoCarrier),
            ResultCode::NoAnswer => Some(CommandErrorKind::NoAnswer),
            ResultCode::Blocklisted => Some(CommandErrorKind::Blocklisted),
            ResultCode::Delayed => Some(CommandErrorKind::Delayed),
        }
    }

    /// Turn this kind into an error for the given command.
    pub fn into_error(self, command: AtCommandId) -> HfError {
        HfError::Command { command, kind: self }
    }
}

impl std::fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandErrorKind::Error => write!(f, "ERROR"),
            CommandErrorKind::Cme(code) => write!(f, "+CME ERROR: {}", code),
            CommandErrorKind::Busy => write!(f, "BUSY"),
            CommandErrorKind::NoCarrier => write!(f, "NO CARRIER"),
            CommandErrorKind::NoAnswer => write!(f, "NO ANSWER"),
            CommandErrorKind::Blocklisted => write!(f, "BLOCKLISTED"),
            CommandErrorKind::Delayed => write!(f, "DELAYED"),
        }
    }
}

/// Result type for HF operations.
pub type Result<T> = std::result::Result<T, HfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(CommandErrorKind::from_result_code(ResultCode::Ok), None);
        assert_eq!(
            CommandErrorKind::from_result_code(ResultCode::CmeError(30)),
            Some(CommandErrorKind::Cme(30))
        );
        assert_eq!(
            CommandErrorKind::from_result_code(ResultCode::NoCarrier),
            Some(CommandErrorKind::NoCarrier)
        );
    }

    #[test]
    fn test_error_display() {
        let err = CommandErrorKind::Busy.into_error(AtCommandId::Atd);
        assert_eq!(err.to_string(), "AG rejected ATD: BUSY");

        let err = HfError::Timeout {
            command: AtCommandId::Clcc,
            after: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("AT+CLCC"));
    }
}
