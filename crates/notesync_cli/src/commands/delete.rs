//! Delete command implementation.

use notesync_engine::{LocalStore, NoteStore};

/// Runs the delete command. Only the local copy is removed.
pub fn run(store: &NoteStore, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    if store.delete(key)? {
        println!("Deleted {key:?}");
    } else {
        println!("No note named {key:?}");
    }
    Ok(())
}
