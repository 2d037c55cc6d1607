//! Merges the local cell and the remote poller output for one key.
//!
//! The reconciler task is the only writer of the merged cell. Local emissions
//! are forwarded as they are. Remote emissions are never forwarded directly:
//! a remote note that is strictly newer than what the key currently holds is
//! written into the local store without a version bump, and reaches readers
//! through the resulting local emission.

use crate::error::{SyncError, SyncResult};
use notesync_store::{LocalStore, Note};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Returns true if `remote` should replace `local`.
///
/// Only a strictly higher version wins. Equal versions keep the local copy so
/// that replaying the same remote state never causes a write.
pub fn should_accept(local: Option<&Note>, remote: &Note) -> bool {
    local.map_or(true, |local| local.is_superseded_by(remote))
}

/// The merged live view of one note.
///
/// Obtained from [`NoteSync::get_synced`](crate::NoteSync::get_synced).
/// Cloned receivers all observe the same cell; notifications for one note
/// come from a single task and are never delivered concurrently.
#[derive(Debug)]
pub struct SyncedNote {
    key: String,
    merged: watch::Receiver<Option<Note>>,
}

impl SyncedNote {
    /// Returns the note key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the current merged value, `None` until either side resolves.
    pub fn current(&self) -> Option<Note> {
        self.merged.borrow().clone()
    }

    /// Subscribes to the merged value.
    pub fn subscribe(&self) -> watch::Receiver<Option<Note>> {
        self.merged.clone()
    }

    /// Waits until the merged value is a note matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Shutdown`] if the reconciler stops first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> SyncResult<Note>
    where
        F: FnMut(&Note) -> bool,
    {
        let mut rx = self.merged.clone();
        let value = rx
            .wait_for(|value| value.as_ref().is_some_and(&mut predicate))
            .await
            .map_err(|_| SyncError::Shutdown)?;
        value.clone().ok_or(SyncError::Shutdown)
    }
}

/// Handle to a running reconciler task. Dropping it stops the task.
#[derive(Debug)]
pub struct Reconciler {
    key: String,
    shutdown: watch::Sender<bool>,
}

impl Reconciler {
    /// Starts merging `store`'s cell for `key` with `remote`.
    ///
    /// The merged cell starts with the local value, so it is populated right
    /// away when the note is already stored locally.
    pub fn spawn(
        key: impl Into<String>,
        store: Arc<dyn LocalStore>,
        remote: watch::Receiver<Option<Note>>,
        runtime: &Handle,
    ) -> (Self, SyncedNote) {
        let key = key.into();
        let mut local = store.observe(&key);
        let (merged_tx, merged) = watch::channel(local.borrow_and_update().clone());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = MergeTask {
            key: key.clone(),
            store,
            local,
            remote,
            merged: merged_tx,
            shutdown: shutdown_rx,
        };
        runtime.spawn(task.run());

        (
            Self {
                key: key.clone(),
                shutdown,
            },
            SyncedNote { key, merged },
        )
    }

    /// Stops merging. Safe to call more than once.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            debug!(key = %self.key, "stopped reconciler");
        }
    }
}

struct MergeTask {
    key: String,
    store: Arc<dyn LocalStore>,
    local: watch::Receiver<Option<Note>>,
    remote: watch::Receiver<Option<Note>>,
    merged: watch::Sender<Option<Note>>,
    shutdown: watch::Receiver<bool>,
}

impl MergeTask {
    async fn run(mut self) {
        // The poller may have published before we subscribed.
        let pending = self.remote.borrow_and_update().clone();
        self.apply_remote(pending).await;

        let mut remote_open = true;
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                changed = self.local.changed() => {
                    if changed.is_err() {
                        warn!(key = %self.key, "local cell closed");
                        break;
                    }
                    let value = self.local.borrow_and_update().clone();
                    self.merged.send_replace(value);
                }
                changed = self.remote.changed(), if remote_open => {
                    if changed.is_err() {
                        debug!(key = %self.key, "remote output closed");
                        remote_open = false;
                        continue;
                    }
                    let value = self.remote.borrow_and_update().clone();
                    self.apply_remote(value).await;
                }
            }
        }
        debug!(key = %self.key, "merge loop exited");
    }

    async fn apply_remote(&self, remote: Option<Note>) -> bool {
        let Some(theirs) = remote else {
            return false;
        };
        if theirs.key != self.key {
            warn!(
                key = %self.key,
                remote_key = %theirs.key,
                "ignoring remote note for another key"
            );
            return false;
        }

        // A local write may not have reached the merged cell yet, so compare
        // against the newer of the two. The store re-checks under its lock.
        let merged = self.merged.borrow().clone();
        let ours = newest(merged, self.store.get(&self.key));
        if !should_accept(ours.as_ref(), &theirs) {
            debug!(
                key = %self.key,
                local_version = ours.as_ref().map(|n| n.version),
                remote_version = theirs.version,
                "discarding remote note"
            );
            return false;
        }

        // Durable stores rewrite their file here, so keep it off the async
        // workers. Awaiting it keeps this task the only merge writer.
        let version = theirs.version;
        let store = Arc::clone(&self.store);
        let write = tokio::task::spawn_blocking(move || store.upsert_if_newer(theirs));
        let written = match write.await {
            Ok(written) => written,
            Err(join) => {
                warn!(key = %self.key, error = %join, "store write task failed");
                return false;
            }
        };
        match written {
            Ok(Some(_)) => {
                info!(key = %self.key, version, "applied remote note");
                true
            }
            Ok(None) => {
                debug!(key = %self.key, version, "local note moved ahead, discarding remote note");
                false
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to store remote note");
                false
            }
        }
    }
}

fn newest(a: Option<Note>, b: Option<Note>) -> Option<Note> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.version > a.version { b } else { a }),
        (a, b) => a.or(b),
    }
}
