//! Error types for the note model and local store.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced while encoding or decoding a [`Note`](crate::Note).
#[derive(Error, Debug)]
pub enum CodecError {
    /// The payload is not a well-formed note document.
    ///
    /// Callers treat this as "no document available", never as a deletion.
    #[error("malformed note payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The note could not be serialized.
    #[error("failed to encode note: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload decoded but carries an empty key.
    #[error("note key must not be empty")]
    EmptyKey,
}

/// Errors that can occur during local store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An I/O error occurred while persisting the snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A note failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The snapshot file exists but cannot be read back.
    #[error("snapshot corrupted: {0}")]
    Corrupted(String),

    /// The stored version is already the highest representable one.
    #[error("version of {0:?} cannot be incremented")]
    VersionOverflow(String),

    /// The note key is not usable as a storage key.
    #[error("invalid note key: {0:?}")]
    InvalidKey(String),
}
