//! CLI command implementations.

pub mod delete;
pub mod get;
pub mod list;
pub mod save;
pub mod watch;

use notesync_engine::{Note, NoteSync, SyncError, SyncedNote};
use std::sync::Arc;
use std::time::Duration;

/// Starts syncing `key` and waits for the server's first answer to be merged.
///
/// If the first fetch fails the local value (or an empty note) is returned.
pub(crate) async fn first_sync(
    sync: &NoteSync,
    key: &str,
) -> Result<(Arc<SyncedNote>, Note), Box<dyn std::error::Error>> {
    let synced = sync.get_synced(key)?;
    let entry = sync.registry().get(key).ok_or(SyncError::Shutdown)?;
    let mut remote = entry.poller().subscribe();

    let limit = sync.config().request_timeout + Duration::from_secs(1);
    let note = tokio::time::timeout(limit, async {
        let remote_version = {
            let value = remote
                .wait_for(Option::is_some)
                .await
                .map_err(|_| SyncError::Shutdown)?;
            value.as_ref().map_or(0, |note| note.version)
        };
        synced.wait_for(|note| note.version >= remote_version).await
    })
    .await
    .map_err(|_| format!("no answer from server for {key:?}"))??;

    Ok((synced, note))
}

/// Prints a note as text or JSON.
pub(crate) fn print_note(note: &Note, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(note)?);
        }
        _ => {
            println!("Title:   {}", note.key);
            println!("Version: {}", note.version);
            println!();
            println!("{}", note.content);
        }
    }
    Ok(())
}
