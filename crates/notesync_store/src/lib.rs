//! # notesync store
//!
//! The note document model and the local side of synchronization.
//!
//! This crate provides:
//! - [`Note`], the versioned document, and its JSON codec
//! - [`LocalStore`], the observable key→note store consumed by the sync engine
//! - [`NoteStore`], an in-memory store with an optional durable snapshot file
//!
//! ## Observability
//!
//! Every key is exposed as a watch cell holding `Option<Note>`. Readers get the
//! current value immediately and are woken on every subsequent write to that
//! key, including writes that store an identical document.
//!
//! ## Example
//!
//! ```rust
//! use notesync_store::{LocalStore, Note, NoteStore};
//!
//! let store = NoteStore::in_memory();
//! let saved = store.upsert(Note::new("groceries", "milk"), true).unwrap();
//! assert_eq!(saved.version, 1);
//! assert_eq!(store.get("groceries"), Some(saved));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod local;
mod note;
mod note_store;

pub use error::{CodecError, CodecResult, StoreError, StoreResult};
pub use local::LocalStore;
pub use note::Note;
pub use note_store::NoteStore;
