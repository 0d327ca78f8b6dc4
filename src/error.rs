//! Error types for ghostdrive
//!
//! One `thiserror` taxonomy shared by every backend, so callers can react
//! to a failure the same way regardless of which transport produced it.

use thiserror::Error;

/// The main error type for ghostdrive operations
#[derive(Error, Debug)]
pub enum Error {
    /// Every cascade strategy was exhausted for a target descriptor
    #[error("element not found for \"{target}\" ({attempts})")]
    ElementNotFound {
        /// The descriptor that could not be resolved
        target: String,
        /// Per-strategy failure summary, in attempt order
        attempts: String,
    },

    /// The page never reached a loaded state within the timeout
    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    /// A bounded wait elapsed without its condition becoming true
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The engine's debugging endpoint never accepted a connection.
    /// Fatal for this backend instance; callers must request a fresh session.
    #[error("debugging endpoint unavailable on port {port}: {reason}")]
    ProtocolUnavailable {
        /// The local debugging port that was polled
        port: u16,
        /// Why the connection could not be established
        reason: String,
    },

    /// An injected script threw inside the page
    #[error("script evaluation failed: {0}")]
    EvaluationFailed(String),

    /// A native dialog appeared and was auto-handled, interrupting the
    /// operation in flight
    #[error("dialog blocked interaction: {0}")]
    DialogBlocked(String),

    /// An operation was invoked before `initialize()` succeeded
    #[error("backend not initialized")]
    NotInitialized,

    /// The operation is not supported on a live session
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Session snapshot could not be written or restored
    #[error("session state error: {0}")]
    Session(String),

    /// Transport-level CDP failure
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Transport-level WebDriver failure
    #[error("WebDriver error: {0}")]
    Driver(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for ghostdrive operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a CDP transport error from a message
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a WebDriver transport error from a message
    pub fn driver<S: Into<String>>(msg: S) -> Self {
        Error::Driver(msg.into())
    }

    /// Build an `ElementNotFound` from the cascade's failure trail
    pub fn element_not_found(target: &str, attempts: &[(&'static str, String)]) -> Self {
        let summary = attempts
            .iter()
            .map(|(strategy, reason)| format!("{strategy}: {reason}"))
            .collect::<Vec<_>>()
            .join("; ");
        Error::ElementNotFound {
            target: target.to_string(),
            attempts: summary,
        }
    }

    /// Whether this failure is fatal for the backend instance
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ProtocolUnavailable { .. })
    }
}

impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

impl From<fantoccini::error::CmdError> for Error {
    fn from(err: fantoccini::error::CmdError) -> Self {
        let msg = err.to_string();
        // the endpoint auto-dismissed a native dialog mid-operation
        if msg.to_lowercase().contains("alert") {
            Error::DialogBlocked(msg)
        } else {
            Error::Driver(msg)
        }
    }
}

impl From<fantoccini::error::NewSessionError> for Error {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        Error::Driver(err.to_string())
    }
}
