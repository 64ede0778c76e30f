//! Error taxonomy and exit-code mapping.
//!
//! Components return `CaptureError` unmodified in meaning; only the binary decides the
//! user-facing text and the process exit code (see `exit_code_for_capture_error`).
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Bad command line: missing arguments or an agent outside the allow-list.
    #[error("{0}")]
    Usage(String),

    /// Missing engine binary or addon script. Fatal, never retried.
    #[error("{message}")]
    Precondition { message: String, remedy: String },

    /// Spawn failure, early exit, or readiness timeout of the proxy engine.
    #[error("{0}")]
    ProcessLifecycle(String),

    /// The wrapped agent command failed or timed out.
    #[error("{0}")]
    CommandExecution(String),

    /// Best-effort cleanup failed; callers log and swallow this.
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CaptureError {
    pub fn precondition(message: impl Into<String>, remedy: impl Into<String>) -> Self {
        CaptureError::Precondition {
            message: message.into(),
            remedy: remedy.into(),
        }
    }

    /// Remediation text for precondition failures, if any.
    pub fn remedy(&self) -> Option<&str> {
        match self {
            CaptureError::Precondition { remedy, .. } if !remedy.is_empty() => Some(remedy),
            _ => None,
        }
    }
}

/// Exit code for a failed session. Every failure maps to 1, io errors included; an interrupt
/// follows the shell convention of 128 + SIGINT.
pub fn exit_code_for_capture_error(e: &CaptureError) -> u8 {
    match e {
        CaptureError::Interrupted => 130,
        _ => 1,
    }
}
