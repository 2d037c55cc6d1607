//! Runtime and engine setup for commands that talk to the server.

use crate::client::ReqwestClient;
use notesync_engine::{HttpTransport, NoteStore, NoteSync, SyncConfig};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// A sync engine bound to a local note file and a server.
///
/// Fields drop in order: the engine shuts down first, then the runtime
/// finishes its blocking calls, and the HTTP client goes last on the
/// calling thread.
pub struct Session {
    sync: NoteSync,
    runtime: Runtime,
    _client: Arc<ReqwestClient>,
}

impl Session {
    /// Opens the local store at `store_path` and connects it to the server
    /// named in `config`.
    pub fn open(config: SyncConfig, store_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let runtime = Builder::new_multi_thread().enable_all().build()?;
        let client = Arc::new(ReqwestClient::new(config.request_timeout)?);
        let store = Arc::new(NoteStore::open(store_path)?);
        let transport = HttpTransport::from_config(&config, Arc::clone(&client))?;
        let sync =
            NoteSync::with_runtime(config, store, Arc::new(transport), runtime.handle().clone())?;
        Ok(Self {
            sync,
            runtime,
            _client: client,
        })
    }

    /// Returns the engine.
    pub fn sync(&self) -> &NoteSync {
        &self.sync
    }

    /// Runs `future` to completion on the session runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
