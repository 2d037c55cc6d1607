//! Save command implementation.

use super::first_sync;
use crate::session::Session;
use notesync_engine::Note;
use tracing::info;

/// Runs the save command.
///
/// Merges the server copy first so the saved version lands above it, then
/// waits for the push before returning.
pub fn run(session: &Session, key: &str, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sync = session.sync();
    let saved = session.block_on(async {
        let (_, current) = first_sync(sync, key).await?;
        let saved = sync.save_synced(Note::new(key, content).with_version(current.version))?;
        sync.flush().await;
        Ok::<_, Box<dyn std::error::Error>>(saved)
    })?;

    info!(key = %saved.key, version = saved.version, "saved note");
    println!("Saved {:?} at version {}", saved.key, saved.version);
    Ok(())
}
