//! Watch command implementation.

use super::print_note;
use crate::session::Session;

/// Runs the watch command. Returns on Ctrl-C.
pub fn run(session: &Session, key: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sync = session.sync();
    session.block_on(async {
        let synced = sync.get_synced(key)?;
        let mut merged = synced.subscribe();
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        loop {
            let current = merged.borrow_and_update().clone();
            if let Some(note) = current {
                print_note(&note, format)?;
                if format != "json" {
                    println!("---");
                }
            }

            tokio::select! {
                changed = merged.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = &mut interrupt => break,
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
