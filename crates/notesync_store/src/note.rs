//! The versioned note document.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};

/// A named, versioned text document.
///
/// `version` is a logical clock: it only ever grows for a given key and is the
/// sole authority when a local and a remote copy disagree. A note that has
/// never been saved has version 0.
///
/// On the wire the key travels as `title`:
///
/// ```json
/// { "title": "groceries", "content": "milk", "version": 3 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier of the note.
    #[serde(rename = "title")]
    pub key: String,
    /// Text payload.
    #[serde(default)]
    pub content: String,
    /// Logical version.
    #[serde(default)]
    pub version: u64,
}

impl Note {
    /// Creates an unsaved note at version 0.
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            version: 0,
        }
    }

    /// Creates the placeholder used when the remote has no record of `key`.
    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(key, "")
    }

    /// Returns this note with `version` replaced.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Returns true if `other` should replace `self`.
    ///
    /// Only a strictly higher version wins; ties keep the current value.
    pub fn is_superseded_by(&self, other: &Note) -> bool {
        self.version < other.version
    }

    /// Encodes the note as a JSON document.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    /// Decodes a note from a JSON document.
    ///
    /// Unknown fields are ignored; a missing or empty `title` is rejected.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let note: Note = serde_json::from_slice(bytes).map_err(CodecError::Decode)?;
        if note.key.is_empty() {
            return Err(CodecError::EmptyKey);
        }
        Ok(note)
    }
}
