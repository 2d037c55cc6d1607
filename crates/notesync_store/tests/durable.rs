//! Durability tests for the snapshot-backed note store.

use notesync_store::{LocalStore, Note, NoteStore, StoreError};
use std::fs;
use tempfile::tempdir;

#[test]
fn notes_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.json");

    {
        let store = NoteStore::open(&path).unwrap();
        store.upsert(Note::new("A", "first"), true).unwrap();
        store.upsert(Note::new("A", "second"), true).unwrap();
        store
            .upsert(Note::new("B", "remote").with_version(7), false)
            .unwrap();
    }

    let store = NoteStore::open(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("A"), Some(Note::new("A", "second").with_version(2)));
    assert_eq!(store.get("B").map(|n| n.version), Some(7));
    assert_eq!(store.observe_all().borrow().len(), 2);
}

#[test]
fn delete_is_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.json");

    {
        let store = NoteStore::open(&path).unwrap();
        store.upsert(Note::new("A", "x"), true).unwrap();
        assert!(store.delete("A").unwrap());
    }

    let store = NoteStore::open(&path).unwrap();
    assert!(!store.exists("A"));
    assert!(store.is_empty());
}

#[test]
fn open_creates_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("notes.json");

    let store = NoteStore::open(&path).unwrap();
    store.upsert(Note::new("A", "x"), true).unwrap();
    assert!(path.exists());
    assert_eq!(store.path(), Some(path.as_path()));
}

#[test]
fn corrupted_snapshot_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.json");
    fs::write(&path, b"{ this is not a snapshot").unwrap();

    assert!(matches!(
        NoteStore::open(&path),
        Err(StoreError::Corrupted(_))
    ));
}

#[test]
fn failed_persist_leaves_memory_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.json");
    let store = NoteStore::open(&path).unwrap();
    store.upsert(Note::new("A", "kept"), true).unwrap();

    // A directory where the temp file should go makes the write fail.
    fs::create_dir(path.with_extension("tmp")).unwrap();

    assert!(store.upsert(Note::new("A", "lost"), true).is_err());
    assert_eq!(store.get("A").map(|n| n.content), Some("kept".to_string()));
    assert!(store.upsert(Note::new("C", "new"), true).is_err());
    assert!(!store.exists("C"));
}
