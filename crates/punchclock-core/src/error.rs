//! Punchclock error taxonomy.
//!
//! The split matters more than usual here: automation paths react to the
//! *category* of a failure, not its message. A transient network failure is
//! swallowed (and never retried same-day by the scheduler), an illegal
//! transition is a no-op, and only `AuthExpired` ever reaches the user.

use crate::types::TimeClockKind;

/// Unified error type for all Punchclock crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Remote API returned a non-success status that is not a 401 and not an
    /// illegal-transition rejection.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The refresh token is expired or the refresh-attempt cap was hit.
    /// Terminal: the user must re-authorize interactively.
    #[error("authorization expired — interactive re-authentication required")]
    AuthExpired,

    /// The service rejected a time-clock write because the transition is not
    /// legal for the current state. Callers treat this as a no-op.
    #[error("illegal time clock transition: {0}")]
    IllegalTransition(TimeClockKind),

    /// A shutdown-deferred write did not complete within its bound.
    #[error("shutdown-deferred write abandoned after timeout")]
    ShutdownTimeout,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error only means "the server already disagrees about
    /// state" rather than a real failure.
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, Error::IllegalTransition(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
