//! Error types for the runner.

use hfp_hf::HfError;
use thiserror::Error;

/// Errors that stop the runner or reject a console line.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Hf(#[from] HfError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown console command '{0}'")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
