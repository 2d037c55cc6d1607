//! Error types for the sync engine.

use notesync_store::{CodecError, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Fetch, write and decode failures inside background tasks are logged and
/// absorbed; they only reach callers through the transport API itself.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Reading a note from the remote failed.
    #[error("fetch failed for {key:?}: {message}")]
    Fetch {
        /// Note key.
        key: String,
        /// Error message.
        message: String,
    },

    /// Writing a note to the remote failed.
    #[error("write failed for {key:?}: {message}")]
    Write {
        /// Note key.
        key: String,
        /// Error message.
        message: String,
    },

    /// A remote payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    /// A remote call exceeded the request timeout.
    #[error("request for {key:?} timed out after {timeout:?}")]
    Timeout {
        /// Note key.
        key: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The local store rejected a write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The note key is empty.
    #[error("invalid note key: {0:?}")]
    InvalidKey(String),

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The engine was built outside of a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// The engine has been shut down.
    #[error("sync engine is shut down")]
    Shutdown,
}

impl SyncError {
    /// Creates a fetch error.
    pub fn fetch(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a write error.
    pub fn write(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Fetch { .. } | SyncError::Write { .. } | SyncError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::fetch("A", "connection refused").is_retryable());
        assert!(SyncError::write("A", "502 Bad Gateway").is_retryable());
        assert!(SyncError::Timeout {
            key: "A".into(),
            timeout: Duration::from_secs(10),
        }
        .is_retryable());
        assert!(!SyncError::Shutdown.is_retryable());
        assert!(!SyncError::InvalidKey(String::new()).is_retryable());
        // A malformed payload will not fix itself on the next poll.
        assert!(!SyncError::from(notesync_store::CodecError::EmptyKey).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NoRuntime;
        assert_eq!(err.to_string(), "no tokio runtime available");

        let err = SyncError::fetch("my note", "status 500");
        assert!(err.to_string().contains("\"my note\""));
        assert!(err.to_string().contains("500"));
    }
}
