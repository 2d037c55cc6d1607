//! Fire-and-forget remote writes.
//!
//! Each key gets one writer task fed through a watch cell. At most one push
//! per key is in flight; saves made while it runs collapse into the latest
//! one, which is pushed next.

use crate::transport::{call_blocking, NoteTransport};
use notesync_store::Note;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, warn};

pub(crate) struct OutboundWriters {
    transport: Arc<dyn NoteTransport>,
    timeout: Duration,
    runtime: Handle,
    writers: Mutex<HashMap<String, Writer>>,
}

struct Writer {
    pending: watch::Sender<Option<Note>>,
    // Version of the last push attempt, successful or not.
    attempted: watch::Receiver<Option<u64>>,
}

impl OutboundWriters {
    pub(crate) fn new(transport: Arc<dyn NoteTransport>, timeout: Duration, runtime: Handle) -> Self {
        Self {
            transport,
            timeout,
            runtime,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// Queues `note` for its key's writer, replacing any queued older note.
    pub(crate) fn submit(&self, note: Note) {
        let mut writers = self.writers.lock();
        if let Some(writer) = writers.get(&note.key) {
            if !writer.pending.is_closed() {
                debug!(key = %note.key, version = note.version, "queued remote write");
                writer.pending.send_replace(Some(note));
                return;
            }
        }

        let key = note.key.clone();
        let (pending, rx) = watch::channel(Some(note));
        let (attempted_tx, attempted) = watch::channel(None);
        self.runtime.spawn(run_writer(
            key.clone(),
            rx,
            attempted_tx,
            Arc::clone(&self.transport),
            self.timeout,
        ));
        writers.insert(key, Writer { pending, attempted });
    }

    /// Waits until the latest queued note of every writer has been pushed
    /// or has failed.
    pub(crate) async fn flush(&self) {
        let targets: Vec<_> = self
            .writers
            .lock()
            .values()
            .filter_map(|writer| {
                let version = writer.pending.borrow().as_ref()?.version;
                Some((version, writer.attempted.clone()))
            })
            .collect();

        for (version, mut attempted) in targets {
            // An exited writer has nothing left to push.
            let _ = attempted
                .wait_for(|last| last.is_some_and(|last| last >= version))
                .await;
        }
    }

    /// Drops every writer; each finishes its current push and exits.
    pub(crate) fn close(&self) {
        self.writers.lock().clear();
    }
}

async fn run_writer(
    key: String,
    mut pending: watch::Receiver<Option<Note>>,
    attempted: watch::Sender<Option<u64>>,
    transport: Arc<dyn NoteTransport>,
    timeout: Duration,
) {
    loop {
        let next = pending.borrow_and_update().clone();
        if let Some(note) = next {
            let version = note.version;
            let transport = Arc::clone(&transport);
            // Dropped when the push returns, even after a timeout.
            let (in_flight, finished) = oneshot::channel::<()>();
            let result = call_blocking(&key, timeout, move || {
                let _in_flight = in_flight;
                transport.push(&note)
            })
            .await;
            if let Err(e) = result {
                if e.is_retryable() {
                    warn!(key = %key, version, error = %e, "remote write failed");
                } else {
                    error!(key = %key, version, error = %e, "remote write failed");
                }
            }
            // A timed-out push may still be running; the next one must not
            // overtake it.
            let _ = finished.await;
            attempted.send_replace(Some(version));
        }

        if pending.changed().await.is_err() {
            break;
        }
    }
    debug!(key = %key, "writer exited");
}
