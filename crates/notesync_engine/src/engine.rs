//! The synchronized note store.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::outbound::OutboundWriters;
use crate::poller::PollerHandle;
use crate::reconciler::{Reconciler, SyncedNote};
use crate::registry::{PollerRegistry, SyncEntry};
use crate::transport::NoteTransport;
use notesync_store::{LocalStore, Note};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

/// Keeps notes consistent between a local store and a polled remote.
///
/// - [`get_synced`](Self::get_synced) returns a live view of a note that
///   follows local writes and newer remote versions.
/// - [`save_synced`](Self::save_synced) stores a note locally with the next
///   version and pushes it to the remote in the background.
///
/// Background work runs on the tokio runtime captured at construction.
pub struct NoteSync {
    config: SyncConfig,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn NoteTransport>,
    runtime: Handle,
    registry: PollerRegistry,
    outbound: OutboundWriters,
    shut_down: AtomicBool,
}

impl NoteSync {
    /// Creates an engine on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoRuntime`] outside of a runtime, or
    /// [`SyncError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn NoteTransport>,
    ) -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        Self::with_runtime(config, store, transport, runtime)
    }

    /// Creates an engine that spawns its background work on `runtime`.
    pub fn with_runtime(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn NoteTransport>,
        runtime: Handle,
    ) -> SyncResult<Self> {
        config.validate()?;
        let outbound =
            OutboundWriters::new(Arc::clone(&transport), config.request_timeout, runtime.clone());
        Ok(Self {
            registry: PollerRegistry::new(config.eviction),
            config,
            store,
            transport,
            runtime,
            outbound,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the poller registry.
    pub fn registry(&self) -> &PollerRegistry {
        &self.registry
    }

    /// Returns the live merged view of `key`.
    ///
    /// The first call for a key starts its poller and returns immediately;
    /// the view resolves once the local store or the first fetch provides a
    /// value. Later calls return the same view.
    pub fn get_synced(&self, key: &str) -> SyncResult<Arc<SyncedNote>> {
        self.ensure_running()?;
        if key.is_empty() {
            return Err(SyncError::InvalidKey(key.to_string()));
        }

        let entry = self.registry.get_or_create(key, || self.start_entry(key));
        Ok(Arc::clone(entry.note()))
    }

    /// Saves `note` locally with the next version and forwards the stored
    /// note to the remote without waiting.
    ///
    /// Only the local write can fail this call. The remote write is
    /// attempted once; if it fails the local note stays as saved and the
    /// next poll reconciles.
    pub fn save_synced(&self, note: Note) -> SyncResult<Note> {
        self.ensure_running()?;
        let saved = self.store.upsert(note, true)?;
        debug!(key = %saved.key, version = saved.version, "saved note locally");
        self.outbound.submit(saved.clone());
        Ok(saved)
    }

    /// Waits until the latest saved note of every key has been pushed to the
    /// remote or has failed to push.
    ///
    /// Useful before exiting a short-lived process, since
    /// [`save_synced`](Self::save_synced) does not wait for the remote.
    pub async fn flush(&self) {
        self.outbound.flush().await;
    }

    /// Subscribes to the local cell for `key`, bypassing the remote.
    pub fn get_local(&self, key: &str) -> watch::Receiver<Option<Note>> {
        self.store.observe(key)
    }

    /// Subscribes to the list of all local notes.
    pub fn get_all_local(&self) -> watch::Receiver<Vec<Note>> {
        self.store.observe_all()
    }

    /// Returns true if `key` is stored locally.
    pub fn exists_local(&self, key: &str) -> bool {
        self.store.exists(key)
    }

    /// Deletes `key` from the local store only.
    ///
    /// A running poller for the key keeps going and will restore the remote
    /// copy on its next fetch.
    pub fn delete_local(&self, key: &str) -> SyncResult<bool> {
        Ok(self.store.delete(key)?)
    }

    /// Stops every poller, reconciler and writer. Further calls to
    /// [`get_synced`](Self::get_synced) and [`save_synced`](Self::save_synced)
    /// fail with [`SyncError::Shutdown`].
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.stop_all();
        self.outbound.close();
        info!("sync engine shut down");
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> SyncResult<()> {
        if self.is_shut_down() {
            Err(SyncError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn start_entry(&self, key: &str) -> SyncEntry {
        let poller = PollerHandle::start(
            key,
            Arc::clone(&self.transport),
            &self.config,
            &self.runtime,
        );
        let (reconciler, note) = Reconciler::spawn(
            key,
            Arc::clone(&self.store),
            poller.subscribe(),
            &self.runtime,
        );
        SyncEntry::new(poller, reconciler, note)
    }
}

impl Drop for NoteSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}
