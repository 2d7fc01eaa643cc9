//! Error types for the AT protocol.

use thiserror::Error;

/// Errors that can occur when encoding commands or decoding replies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AtError {
    /// Failed to parse the argument of a reply.
    #[error("malformed {prefix} reply: {reason}")]
    MalformedReply {
        /// Reply prefix the argument belonged to.
        prefix: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A command could not be built from the given parameters.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Receive buffer grew past its limit without a frame terminator.
    #[error("buffer overflow: max {max} bytes, got {actual}")]
    BufferOverflow { max: usize, actual: usize },
}

impl AtError {
    /// Create a malformed-reply error for the given prefix.
    pub fn malformed(prefix: &'static str, reason: impl Into<String>) -> Self {
        AtError::MalformedReply {
            prefix,
            reason: reason.into(),
        }
    }
}

/// Result type alias for AT protocol operations.
pub type AtResult<T> = Result<T, AtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AtError::malformed("+CIEV:", "missing value");
        assert_eq!(err.to_string(), "malformed +CIEV: reply: missing value");

        let err = AtError::BufferOverflow { max: 16, actual: 20 };
        assert!(err.to_string().contains("max 16"));
    }
}
