//! Per-note remote poller.
//!
//! A poller fetches one key on a fixed schedule and publishes what it finds
//! into a watch cell. The schedule is driven by a timer, not by fetch
//! completion: a slow fetch never delays the next tick, but a tick that fires
//! while the previous fetch is still running is skipped, so at most one fetch
//! per key is ever in flight.

use crate::config::SyncConfig;
use crate::transport::{call_blocking, NoteTransport};
use notesync_store::Note;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counters describing a poller's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Fetches started.
    pub attempts: u64,
    /// Fetches that returned a note.
    pub successes: u64,
    /// Fetches for which the remote had no record.
    pub not_found: u64,
    /// Fetches that failed or timed out.
    pub failures: u64,
    /// Ticks skipped because a fetch was still in flight.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    not_found: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PollerStats {
        PollerStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Clears the in-flight flag when the fetch that set it is done, even if that
/// happens after the poller stopped waiting for it.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a running poller.
///
/// Dropping the handle stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    key: String,
    output: watch::Receiver<Option<Note>>,
    counters: Arc<Counters>,
    shutdown: watch::Sender<bool>,
}

impl PollerHandle {
    /// Starts polling `key` on `runtime`. The first fetch fires immediately.
    pub fn start(
        key: impl Into<String>,
        transport: Arc<dyn NoteTransport>,
        config: &SyncConfig,
        runtime: &Handle,
    ) -> Self {
        let key = key.into();
        let (output_tx, output) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let poll = PollLoop {
            key: key.clone(),
            transport,
            period: config.poll_interval,
            timeout: config.request_timeout,
            output: Arc::new(output_tx),
            counters: Arc::clone(&counters),
            in_flight: Arc::new(AtomicBool::new(false)),
            shutdown: shutdown_rx,
        };
        runtime.spawn(poll.run());

        info!(key = %key, period = ?config.poll_interval, "started poller");
        Self {
            key,
            output,
            counters,
            shutdown,
        }
    }

    /// Returns the polled key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the last published remote note.
    pub fn latest(&self) -> Option<Note> {
        self.output.borrow().clone()
    }

    /// Subscribes to published remote notes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Note>> {
        self.output.clone()
    }

    /// Returns the activity counters.
    pub fn stats(&self) -> PollerStats {
        self.counters.snapshot()
    }

    /// Stops the poller. Safe to call more than once.
    ///
    /// A fetch already in flight may finish, but its result is discarded.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!(key = %self.key, "stopped poller");
        }
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}

struct PollLoop {
    key: String,
    transport: Arc<dyn NoteTransport>,
    period: Duration,
    timeout: Duration,
    output: Arc<watch::Sender<Option<Note>>>,
    counters: Arc<Counters>,
    in_flight: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

impl PollLoop {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.tick(),
            }
        }
        debug!(key = %self.key, "poll loop exited");
    }

    fn tick(&self) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(key = %self.key, "previous fetch still in flight, skipping tick");
            return;
        }
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        let fetch = Fetch {
            key: self.key.clone(),
            transport: Arc::clone(&self.transport),
            timeout: self.timeout,
            output: Arc::clone(&self.output),
            counters: Arc::clone(&self.counters),
            shutdown: self.shutdown.clone(),
        };
        tokio::spawn(fetch.run(InFlight(Arc::clone(&self.in_flight))));
    }
}

struct Fetch {
    key: String,
    transport: Arc<dyn NoteTransport>,
    timeout: Duration,
    output: Arc<watch::Sender<Option<Note>>>,
    counters: Arc<Counters>,
    shutdown: watch::Receiver<bool>,
}

impl Fetch {
    async fn run(self, guard: InFlight) {
        let transport = Arc::clone(&self.transport);
        let key = self.key.clone();
        let result = call_blocking(&self.key, self.timeout, move || {
            let _guard = guard;
            transport.fetch(&key)
        })
        .await;

        if *self.shutdown.borrow() {
            debug!(key = %self.key, "poller stopped, discarding fetch result");
            return;
        }

        // Subscribers must never be left without a value: until the first
        // note is published, a miss resolves to an empty note.
        let unresolved = self.output.borrow().is_none();
        match result {
            Ok(Some(note)) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %self.key, version = note.version, "publishing remote note");
                self.output.send_replace(Some(note));
            }
            Ok(None) => {
                self.counters.not_found.fetch_add(1, Ordering::Relaxed);
                if unresolved {
                    self.output.send_replace(Some(Note::empty(&self.key)));
                }
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                if e.is_retryable() {
                    warn!(key = %self.key, error = %e, "remote fetch failed");
                } else {
                    error!(key = %self.key, error = %e, "remote fetch failed");
                }
                if unresolved {
                    self.output.send_replace(Some(Note::empty(&self.key)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use tokio::time::{sleep, timeout};

    fn config(period_ms: u64) -> SyncConfig {
        SyncConfig::new("memory://")
            .with_poll_interval(Duration::from_millis(period_ms))
            .with_request_timeout(Duration::from_millis(500))
    }

    async fn next_note(rx: &mut watch::Receiver<Option<Note>>) -> Note {
        timeout(Duration::from_secs(5), rx.wait_for(Option::is_some))
            .await
            .expect("poller published nothing")
            .expect("poller output closed")
            .clone()
            .unwrap()
    }

    #[tokio::test]
    async fn first_fetch_fires_immediately() {
        let remote = Arc::new(MockTransport::new());
        remote.set_remote(Note::new("A", "hello").with_version(3));

        // A long period proves the first fetch does not wait for it.
        let poller = PollerHandle::start("A", remote.clone(), &config(60_000), &Handle::current());
        let mut rx = poller.subscribe();
        let note = next_note(&mut rx).await;

        assert_eq!(note, Note::new("A", "hello").with_version(3));
        assert_eq!(poller.latest(), Some(note));
        assert_eq!(poller.stats().successes, 1);
    }

    #[tokio::test]
    async fn missing_remote_resolves_to_empty_note() {
        let remote = Arc::new(MockTransport::new());
        let poller = PollerHandle::start("A", remote.clone(), &config(60_000), &Handle::current());
        let mut rx = poller.subscribe();

        assert_eq!(next_note(&mut rx).await, Note::empty("A"));
        assert_eq!(poller.stats().not_found, 1);
    }

    #[tokio::test]
    async fn failed_first_fetch_resolves_to_empty_note() {
        let remote = Arc::new(MockTransport::new());
        remote.set_connected(false);
        let poller = PollerHandle::start("A", remote.clone(), &config(60_000), &Handle::current());
        let mut rx = poller.subscribe();

        assert_eq!(next_note(&mut rx).await, Note::empty("A"));
        assert_eq!(poller.stats().failures, 1);
    }

    #[tokio::test]
    async fn later_failures_keep_last_value() {
        let remote = Arc::new(MockTransport::new());
        remote.set_remote(Note::new("A", "kept").with_version(2));
        let poller = PollerHandle::start("A", remote.clone(), &config(10), &Handle::current());
        let mut rx = poller.subscribe();
        next_note(&mut rx).await;

        remote.set_connected(false);
        let failures_before = poller.stats().failures;
        timeout(Duration::from_secs(5), async {
            while poller.stats().failures < failures_before + 3 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(poller.latest(), Some(Note::new("A", "kept").with_version(2)));
        poller.stop();
    }

    #[tokio::test]
    async fn picks_up_remote_changes() {
        let remote = Arc::new(MockTransport::new());
        remote.set_remote(Note::new("A", "one").with_version(1));
        let poller = PollerHandle::start("A", remote.clone(), &config(10), &Handle::current());
        let mut rx = poller.subscribe();
        next_note(&mut rx).await;

        remote.set_remote(Note::new("A", "two").with_version(2));
        let note = timeout(
            Duration::from_secs(5),
            rx.wait_for(|n| n.as_ref().is_some_and(|n| n.version == 2)),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(note.unwrap().content, "two");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_fetches_never_overlap() {
        let remote = Arc::new(MockTransport::new());
        remote.set_fetch_delay(Duration::from_millis(60));
        let poller = PollerHandle::start("A", remote.clone(), &config(10), &Handle::current());

        sleep(Duration::from_millis(400)).await;
        poller.stop();

        assert_eq!(remote.max_concurrent_fetches(), 1);
        let stats = poller.stats();
        assert!(stats.skipped > 0, "expected skipped ticks, got {stats:?}");
        assert!(stats.attempts >= 2);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let remote = Arc::new(MockTransport::new());
        remote.set_fetch_delay(Duration::from_millis(300));
        let config = config(60_000).with_request_timeout(Duration::from_millis(20));
        let poller = PollerHandle::start("A", remote.clone(), &config, &Handle::current());
        let mut rx = poller.subscribe();

        assert_eq!(next_note(&mut rx).await, Note::empty("A"));
        assert_eq!(poller.stats().failures, 1);
    }

    #[tokio::test]
    async fn stop_halts_fetching() {
        let remote = Arc::new(MockTransport::new());
        let poller = PollerHandle::start("A", remote.clone(), &config(10), &Handle::current());
        let mut rx = poller.subscribe();
        next_note(&mut rx).await;

        poller.stop();
        poller.stop();
        assert!(poller.is_stopped());

        // Let any fetch that was already in flight drain.
        sleep(Duration::from_millis(50)).await;
        let count = remote.fetch_count();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(remote.fetch_count(), count);
    }

    #[tokio::test]
    async fn result_after_stop_is_discarded() {
        let remote = Arc::new(MockTransport::new());
        remote.set_remote(Note::new("A", "late").with_version(1));
        remote.set_fetch_delay(Duration::from_millis(100));
        let poller = PollerHandle::start("A", remote.clone(), &config(60_000), &Handle::current());

        sleep(Duration::from_millis(20)).await;
        poller.stop();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(remote.fetch_count(), 1);
        assert_eq!(poller.latest(), None);
    }
}
