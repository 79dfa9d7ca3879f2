//! Structured error types for the browser session
//!
//! One central enum maps the failure taxonomy onto variants: usage errors
//! caught before any network call, workflow-local aborts (type negotiation,
//! stream faults, rejected requests), and the fatal class that terminates the
//! session after orderly disconnect.

use thiserror::Error;

/// Primary error type for browser operations.
#[derive(Error, Debug)]
pub enum BrowseError {
    /// Malformed command arguments, detected locally. Non-fatal.
    #[error("{0}")]
    Usage(String),

    /// Attribute type negotiation exhausted its prompt attempts.
    #[error("attribute type for \"{name}\" not recognized")]
    TypeNotRecognized { name: String },

    /// The supplied text could not be encoded with the chosen value kind.
    #[error("cannot encode \"{input}\" as {kind}: {reason}")]
    EncodingFailed {
        kind: &'static str,
        input: String,
        reason: String,
    },

    /// A link failed to connect or to become ready in time.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The remote store rejected a request (send, create, expire, delete).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// A historical range stream surfaced its error flag mid-drain.
    #[error("stream fault: {0}")]
    StreamFault(String),

    /// A copy batch stopped partway; `sent` attributes were already written
    /// and are not rolled back.
    #[error("copy aborted after {sent} attribute(s): {reason}")]
    CopyAborted { sent: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Truly unexpected fault; escapes handler-local recovery and terminates
    /// the session.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl BrowseError {
    /// Whether this error must terminate the session instead of being
    /// reported as a one-line message at the dispatch boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Io(_))
    }

    /// Shorthand for a usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }
}

/// Result type alias using BrowseError.
pub type Result<T> = std::result::Result<T, BrowseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BrowseError::Fatal("boom".to_string()).is_fatal());
        assert!(BrowseError::Io(std::io::Error::other("pipe")).is_fatal());
        assert!(!BrowseError::usage("missing argument").is_fatal());
        assert!(!BrowseError::StreamFault("range aborted".to_string()).is_fatal());
        assert!(!BrowseError::Rejected("update refused".to_string()).is_fatal());
    }

    #[test]
    fn test_copy_aborted_message_carries_partial_count() {
        let e = BrowseError::CopyAborted {
            sent: 3,
            reason: "request rejected: send refused".to_string(),
        };
        assert!(e.to_string().contains("after 3 attribute(s)"));
    }
}
