//! Failure taxonomy for stage actions and scans.
//!
//! Every collaborator call resolves into one of three stage error classes,
//! which decide retry and isolation behavior:
//! - `Transient`: retried with backoff, then recorded as terminal failure
//! - `InputInvalid`: never retried, artifact fails for this cycle, others continue
//! - `ExternalUnavailable`: remaining stages for the whole account are aborted
//!   this cycle; other accounts are unaffected

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stage action failure
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Network/API hiccup or stalled subprocess; worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// The input itself is unusable (e.g. zero-length media); retrying cannot help
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// The external collaborator is down; abort remaining stages for the account
    #[error("external collaborator unavailable: {0}")]
    ExternalUnavailable(String),
}

impl StageError {
    /// Classification used in error signatures
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Transient(_) => ErrorKind::Transient,
            StageError::InputInvalid(_) => ErrorKind::InputInvalid,
            StageError::ExternalUnavailable(_) => ErrorKind::ExternalUnavailable,
        }
    }

    /// Only transient failures are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Transient(_))
    }

    /// Classify an I/O error: missing files are an input problem, everything
    /// else is worth another attempt
    pub fn from_io(context: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                StageError::InputInvalid(format!("{context}: {err}"))
            }
            _ => StageError::Transient(format!("{context}: {err}")),
        }
    }
}

/// Stable failure class, persisted in snapshots and error signatures
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    InputInvalid,
    ExternalUnavailable,

    /// A folder could not be enumerated during the scan
    Scan,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::InputInvalid => "input_invalid",
            ErrorKind::ExternalUnavailable => "external_unavailable",
            ErrorKind::Scan => "scan",
        };
        f.write_str(s)
    }
}
