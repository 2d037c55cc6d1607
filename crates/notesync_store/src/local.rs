//! Local store abstraction consumed by the sync engine.

use crate::error::StoreResult;
use crate::note::Note;
use tokio::sync::watch;

/// Durable key→note storage exposed as observable cells.
///
/// Implementations must emit on the key's cell after every successful
/// [`upsert`](LocalStore::upsert) or [`delete`](LocalStore::delete), in the
/// order the writes were applied.
pub trait LocalStore: Send + Sync {
    /// Subscribes to the cell for `key`.
    ///
    /// The receiver holds the current value (`None` if the key is unknown).
    fn observe(&self, key: &str) -> watch::Receiver<Option<Note>>;

    /// Subscribes to the list of all notes, ordered by key.
    fn observe_all(&self) -> watch::Receiver<Vec<Note>>;

    /// Returns the current note for `key`.
    fn get(&self, key: &str) -> Option<Note>;

    /// Inserts or replaces a note and returns the stored value.
    ///
    /// With `increment_version` the stored version is exactly one more than
    /// the version currently held for the key (or than `note.version` if the
    /// key is unknown). Without it the note is stored verbatim; this is the
    /// path used when applying a remote copy.
    fn upsert(&self, note: Note, increment_version: bool) -> StoreResult<Note>;

    /// Stores `note` verbatim only if its version is strictly higher than
    /// the stored one. Returns the stored note, or `None` if it was rejected.
    ///
    /// The default implementation checks and writes in two steps; stores
    /// that can race with concurrent saves should override it with an atomic
    /// version.
    fn upsert_if_newer(&self, note: Note) -> StoreResult<Option<Note>> {
        match self.get(&note.key) {
            Some(current) if !current.is_superseded_by(&note) => Ok(None),
            _ => self.upsert(note, false).map(Some),
        }
    }

    /// Returns true if a note is stored under `key`.
    fn exists(&self, key: &str) -> bool;

    /// Removes the note stored under `key`. Returns false if there was none.
    fn delete(&self, key: &str) -> StoreResult<bool>;
}
