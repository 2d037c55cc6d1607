//! Transport layer abstraction for remote notes.

use crate::error::{SyncError, SyncResult};
use notesync_store::Note;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A note transport reads and writes notes on the remote server.
///
/// Calls are blocking; the engine always runs them on the blocking thread
/// pool under its request timeout, so implementations need no timeout or
/// threading of their own.
pub trait NoteTransport: Send + Sync + 'static {
    /// Fetches the remote note for `key`. `Ok(None)` means the server has no
    /// record of it.
    fn fetch(&self, key: &str) -> SyncResult<Option<Note>>;

    /// Stores `note` on the remote and returns the acknowledgement body.
    fn push(&self, note: &Note) -> SyncResult<String>;
}

/// Runs a blocking transport call off the async threads, bounded by `timeout`.
///
/// On timeout the call keeps running on its blocking thread and its result
/// is dropped.
pub(crate) async fn call_blocking<T, F>(key: &str, timeout: Duration, call: F) -> SyncResult<T>
where
    F: FnOnce() -> SyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(SyncError::TaskFailed(join.to_string())),
        Err(_) => Err(SyncError::Timeout {
            key: key.to_string(),
            timeout,
        }),
    }
}

/// An in-memory remote for tests and demos.
///
/// Supports latency and outage injection and records every call.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    notes: Mutex<HashMap<String, Note>>,
    pushed: Mutex<Vec<Note>>,
    fetch_delay: Mutex<Duration>,
    push_delay: Mutex<Duration>,
    fetches: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl MockTransport {
    /// Creates a new, connected mock transport with no notes.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Places `note` on the mock server, replacing any copy.
    pub fn set_remote(&self, note: Note) {
        self.notes.lock().insert(note.key.clone(), note);
    }

    /// Returns the server's copy of `key`.
    pub fn remote(&self, key: &str) -> Option<Note> {
        self.notes.lock().get(key).cloned()
    }

    /// Sets the connected state. While disconnected every call fails.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Delays every fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    /// Delays every push by `delay`.
    pub fn set_push_delay(&self, delay: Duration) {
        *self.push_delay.lock() = delay;
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were ever running at the same time.
    pub fn max_concurrent_fetches(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every note passed to [`push`](NoteTransport::push), in call order.
    pub fn pushed(&self) -> Vec<Note> {
        self.pushed.lock().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl NoteTransport for MockTransport {
    fn fetch(&self, key: &str) -> SyncResult<Option<Note>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let result = if self.is_connected() {
            Ok(self.remote(key))
        } else {
            Err(SyncError::fetch(key, "not connected"))
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn push(&self, note: &Note) -> SyncResult<String> {
        self.pushed.lock().push(note.clone());

        let delay = *self.push_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if !self.is_connected() {
            return Err(SyncError::write(&note.key, "not connected"));
        }
        self.set_remote(note.clone());
        Ok(format!("stored {} at version {}", note.key, note.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_transport_round_trip() {
        let transport = MockTransport::new();
        assert!(transport.fetch("A").unwrap().is_none());

        let note = Note::new("A", "hello").with_version(3);
        transport.push(&note).unwrap();
        assert_eq!(transport.fetch("A").unwrap(), Some(note.clone()));
        assert_eq!(transport.pushed(), vec![note]);
        assert_eq!(transport.fetch_count(), 2);
    }

    #[test]
    fn mock_transport_not_connected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        assert!(matches!(
            transport.fetch("A"),
            Err(SyncError::Fetch { .. })
        ));
        let result = transport.push(&Note::new("A", "x"));
        assert!(matches!(result, Err(SyncError::Write { .. })));
        // Failed pushes are still recorded, but the server copy is untouched.
        assert_eq!(transport.pushed().len(), 1);
        assert!(transport.remote("A").is_none());
    }

    #[tokio::test]
    async fn call_blocking_times_out() {
        let result: SyncResult<()> = call_blocking("slow", Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SyncError::Timeout { .. })));
    }

    #[tokio::test]
    async fn call_blocking_returns_result() {
        let result = call_blocking("fast", Duration::from_secs(1), || Ok(7)).await;
        assert_eq!(result.unwrap(), 7);
    }
}
