//! List command implementation.

use notesync_engine::{LocalStore, NoteStore};

/// Runs the list command.
pub fn run(store: &NoteStore, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let notes = store.observe_all().borrow().clone();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&notes)?);
        }
        _ => {
            if notes.is_empty() {
                println!("No notes stored");
            }
            for note in &notes {
                println!("{:>8}  {}", note.version, note.key);
            }
        }
    }

    Ok(())
}
