//! Reference local store: observable cells over an ordered map, optionally
//! backed by a JSON snapshot file.

use crate::error::{CodecError, StoreError, StoreResult};
use crate::local::LocalStore;
use crate::note::Note;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info};

/// A local note store.
///
/// All notes live in memory. When opened with a path, the full set of notes
/// is rewritten to that file after every mutation (write to a sibling temp
/// file, sync, rename), so a crash leaves either the old or the new snapshot.
///
/// # Thread Safety
///
/// Writes are serialized by an internal lock that is also held while the
/// cells are notified, so emissions for a key follow write order.
///
/// # Example
///
/// ```no_run
/// use notesync_store::{LocalStore, Note, NoteStore};
/// use std::path::Path;
///
/// let store = NoteStore::open(Path::new("notes.json")).unwrap();
/// store.upsert(Note::new("todo", "write tests"), true).unwrap();
/// ```
pub struct NoteStore {
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
    all: watch::Sender<Vec<Note>>,
}

struct Inner {
    notes: BTreeMap<String, Note>,
    cells: HashMap<String, watch::Sender<Option<Note>>>,
}

impl NoteStore {
    /// Creates an empty store that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_notes(None, BTreeMap::new())
    }

    /// Opens or creates a store persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read or parsed,
    /// or if the parent directory cannot be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let notes = if path.exists() {
            let bytes = fs::read(path)?;
            let list: Vec<Note> = serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupted(format!("{}: {}", path.display(), e)))?;
            list.into_iter().map(|n| (n.key.clone(), n)).collect()
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), notes = notes.len(), "opened note store");
        Ok(Self::from_notes(Some(path.to_path_buf()), notes))
    }

    fn from_notes(path: Option<PathBuf>, notes: BTreeMap<String, Note>) -> Self {
        let (all, _) = watch::channel(notes.values().cloned().collect());
        Self {
            path,
            inner: Mutex::new(Inner {
                notes,
                cells: HashMap::new(),
            }),
            all,
        }
    }

    /// Returns the snapshot path, if the store is durable.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the number of stored notes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().notes.len()
    }

    /// Returns true if the store holds no notes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, notes: &BTreeMap<String, Note>) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let list: Vec<&Note> = notes.values().collect();
        let bytes = serde_json::to_vec_pretty(&list).map_err(CodecError::Encode)?;

        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn write(&self, inner: &mut Inner, note: Note) -> StoreResult<Note> {
        let previous = inner.notes.insert(note.key.clone(), note.clone());
        if let Err(e) = self.persist(&inner.notes) {
            match previous {
                Some(prior) => inner.notes.insert(note.key.clone(), prior),
                None => inner.notes.remove(&note.key),
            };
            return Err(e);
        }

        debug!(key = %note.key, version = note.version, "stored note");
        self.notify(inner, &note.key, Some(note.clone()));
        Ok(note)
    }

    fn notify(&self, inner: &Inner, key: &str, value: Option<Note>) {
        if let Some(cell) = inner.cells.get(key) {
            cell.send_replace(value);
        }
        self.all.send_replace(inner.notes.values().cloned().collect());
    }
}

impl LocalStore for NoteStore {
    fn observe(&self, key: &str) -> watch::Receiver<Option<Note>> {
        let mut inner = self.inner.lock();
        let current = inner.notes.get(key).cloned();
        inner
            .cells
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }

    fn observe_all(&self) -> watch::Receiver<Vec<Note>> {
        self.all.subscribe()
    }

    fn get(&self, key: &str) -> Option<Note> {
        self.inner.lock().notes.get(key).cloned()
    }

    fn upsert(&self, mut note: Note, increment_version: bool) -> StoreResult<Note> {
        if note.key.is_empty() {
            return Err(StoreError::InvalidKey(note.key));
        }

        let mut inner = self.inner.lock();
        if increment_version {
            let base = inner
                .notes
                .get(&note.key)
                .map(|prior| prior.version)
                .unwrap_or(note.version);
            note.version = base
                .checked_add(1)
                .ok_or_else(|| StoreError::VersionOverflow(note.key.clone()))?;
        }
        self.write(&mut inner, note)
    }

    fn upsert_if_newer(&self, note: Note) -> StoreResult<Option<Note>> {
        if note.key.is_empty() {
            return Err(StoreError::InvalidKey(note.key));
        }

        let mut inner = self.inner.lock();
        if let Some(current) = inner.notes.get(&note.key) {
            if !current.is_superseded_by(&note) {
                return Ok(None);
            }
        }
        self.write(&mut inner, note).map(Some)
    }

    fn exists(&self, key: &str) -> bool {
        self.inner.lock().notes.contains_key(key)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let Some(removed) = inner.notes.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&inner.notes) {
            inner.notes.insert(key.to_string(), removed);
            return Err(e);
        }

        debug!(key = %key, "deleted note");
        self.notify(&inner, key, None);
        Ok(true)
    }
}
