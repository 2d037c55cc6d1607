//! Get command implementation.

use super::{first_sync, print_note};
use crate::session::Session;

/// Runs the get command.
pub fn run(session: &Session, key: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (_, note) = session.block_on(first_sync(session.sync(), key))?;
    print_note(&note, format)
}
