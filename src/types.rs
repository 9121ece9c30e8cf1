//! Shared error and status types

use thiserror::Error;

/// Outcome of a verification run.
///
/// `Falsified` never softens once produced; `Unverifiable` takes precedence
/// over `Verified` but not over `Falsified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// The proof could not be checked against its claims
    Unverifiable,
    /// The proof contradicts the data it claims to preserve
    Falsified,
    /// The proof holds
    Verified,
}

/// Error type for the verification engine
///
/// `Falsified` and `Unverifiable` carry a verification status; everything
/// else is a transport/IO-style failure that the caller surfaces unchanged
/// rather than presenting as a verification outcome.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A deterministic comparison failed against a defined expected value
    #[error("{0}")]
    Falsified(String),

    /// Verification cannot proceed (scope mismatch, unsupported anchor, ...)
    #[error("{0}")]
    Unverifiable(String),

    /// MongoDB errors
    #[error("database error: {0}")]
    Database(String),

    /// Network errors talking to anchor URIs or chain endpoints
    #[error("transport error: {0}")]
    Transport(String),

    /// Proof encoding/decoding errors
    #[error("codec error: {0}")]
    Codec(String),

    /// Invalid user-supplied input (filters, paths, key material)
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VerifyError {
    pub fn falsified(msg: impl Into<String>) -> Self {
        VerifyError::Falsified(msg.into())
    }

    pub fn unverifiable(msg: impl Into<String>) -> Self {
        VerifyError::Unverifiable(msg.into())
    }

    /// The verification status this error carries, if any.
    pub fn status(&self) -> Option<VerificationStatus> {
        match self {
            VerifyError::Falsified(_) => Some(VerificationStatus::Falsified),
            VerifyError::Unverifiable(_) => Some(VerificationStatus::Unverifiable),
            _ => None,
        }
    }

    /// Rebuild this error with a message prefix, keeping its status kind.
    pub fn with_prefix(self, prefix: &str) -> Self {
        match self {
            VerifyError::Falsified(m) => VerifyError::Falsified(format!("{prefix}{m}")),
            VerifyError::Unverifiable(m) => VerifyError::Unverifiable(format!("{prefix}{m}")),
            VerifyError::Database(m) => VerifyError::Database(format!("{prefix}{m}")),
            VerifyError::Transport(m) => VerifyError::Transport(format!("{prefix}{m}")),
            VerifyError::Codec(m) => VerifyError::Codec(format!("{prefix}{m}")),
            VerifyError::InvalidInput(m) => VerifyError::InvalidInput(format!("{prefix}{m}")),
            VerifyError::Io(e) => VerifyError::InvalidInput(format!("{prefix}{e}")),
        }
    }
}

impl From<mongodb::error::Error> for VerifyError {
    fn from(e: mongodb::error::Error) -> Self {
        VerifyError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for VerifyError {
    fn from(e: reqwest::Error) -> Self {
        VerifyError::Transport(e.to_string())
    }
}

pub type Result<T, E = VerifyError> = std::result::Result<T, E>;

/// Human-facing result of a top-level verification entry point
#[derive(Debug, Clone)]
pub struct Verdict {
    pub status: VerificationStatus,
    /// One-line summary, e.g. ``Database `demo` in version 3 is verified``
    pub message: String,
    /// Underlying failure detail when the status is not `Verified`
    pub detail: Option<String>,
}

impl Verdict {
    pub fn verified(message: impl Into<String>) -> Self {
        Verdict {
            status: VerificationStatus::Verified,
            message: message.into(),
            detail: None,
        }
    }
}
