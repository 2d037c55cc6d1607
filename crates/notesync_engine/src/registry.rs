//! Registry of live pollers, one per key.

use crate::config::EvictionPolicy;
use crate::poller::{PollerHandle, PollerStats};
use crate::reconciler::{Reconciler, SyncedNote};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// A poller, its reconciler and the merged view they feed.
#[derive(Debug)]
pub struct SyncEntry {
    poller: PollerHandle,
    reconciler: Reconciler,
    note: Arc<SyncedNote>,
    last_access: AtomicU64,
}

impl SyncEntry {
    /// Bundles a started poller and reconciler.
    pub fn new(poller: PollerHandle, reconciler: Reconciler, note: SyncedNote) -> Self {
        Self {
            poller,
            reconciler,
            note: Arc::new(note),
            last_access: AtomicU64::new(0),
        }
    }

    /// Returns the merged view.
    pub fn note(&self) -> &Arc<SyncedNote> {
        &self.note
    }

    /// Returns the poller.
    pub fn poller(&self) -> &PollerHandle {
        &self.poller
    }

    /// Returns the poller's counters.
    pub fn stats(&self) -> PollerStats {
        self.poller.stats()
    }

    /// Stops the poller and the reconciler.
    pub fn stop(&self) {
        self.poller.stop();
        self.reconciler.stop();
    }

    fn touch(&self, tick: u64) {
        self.last_access.store(tick, Ordering::Relaxed);
    }
}

/// Maps each key to its [`SyncEntry`].
///
/// Lookups of existing keys share a read lock. Creation takes the write lock
/// and re-checks the key, so concurrent first access to the same key creates
/// exactly one entry.
#[derive(Debug)]
pub struct PollerRegistry {
    entries: RwLock<HashMap<String, Arc<SyncEntry>>>,
    eviction: EvictionPolicy,
    clock: AtomicU64,
}

impl PollerRegistry {
    /// Creates an empty registry.
    pub fn new(eviction: EvictionPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            eviction,
            clock: AtomicU64::new(0),
        }
    }

    /// Returns the entry for `key`, calling `create` if there is none.
    ///
    /// `create` runs under the write lock and at most once per missing key.
    pub fn get_or_create<F>(&self, key: &str, create: F) -> Arc<SyncEntry>
    where
        F: FnOnce() -> SyncEntry,
    {
        if let Some(entry) = self.entries.read().get(key) {
            entry.touch(self.tick());
            return Arc::clone(entry);
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            entry.touch(self.tick());
            return Arc::clone(entry);
        }

        if let EvictionPolicy::MaxEntries(max) = self.eviction {
            while entries.len() >= max.max(1) {
                let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                if let Some(evicted) = entries.remove(&oldest) {
                    evicted.stop();
                    info!(key = %oldest, "evicted poller");
                }
            }
        }

        let entry = Arc::new(create());
        entry.touch(self.tick());
        entries.insert(key.to_string(), Arc::clone(&entry));
        info!(key = %key, pollers = entries.len(), "registered poller");
        entry
    }

    /// Returns the entry for `key` without creating one.
    pub fn get(&self, key: &str) -> Option<Arc<SyncEntry>> {
        self.entries.read().get(key).cloned()
    }

    /// Returns true if `key` has an entry.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stops and removes the entry for `key`.
    pub fn remove(&self, key: &str) -> bool {
        match self.entries.write().remove(key) {
            Some(entry) => {
                entry.stop();
                info!(key = %key, "removed poller");
                true
            }
            None => false,
        }
    }

    /// Stops and removes every entry.
    pub fn stop_all(&self) {
        let drained: Vec<_> = self.entries.write().drain().collect();
        for (_, entry) in &drained {
            entry.stop();
        }
        if !drained.is_empty() {
            info!(pollers = drained.len(), "stopped all pollers");
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::transport::MockTransport;
    use notesync_store::NoteStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::runtime::Handle;

    fn make_entry(key: &str) -> SyncEntry {
        let config = SyncConfig::new("memory://").with_poll_interval(Duration::from_secs(60));
        let runtime = Handle::current();
        let poller = PollerHandle::start(key, Arc::new(MockTransport::new()), &config, &runtime);
        let (reconciler, note) = Reconciler::spawn(
            key,
            Arc::new(NoteStore::in_memory()),
            poller.subscribe(),
            &runtime,
        );
        SyncEntry::new(poller, reconciler, note)
    }

    #[tokio::test]
    async fn get_or_create_creates_once() {
        let registry = PollerRegistry::new(EvictionPolicy::Never);
        let created = AtomicUsize::new(0);

        let first = registry.get_or_create("A", || {
            created.fetch_add(1, Ordering::SeqCst);
            make_entry("A")
        });
        let second = registry.get_or_create("A", || {
            created.fetch_add(1, Ordering::SeqCst);
            make_entry("A")
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("A"));
    }

    #[tokio::test]
    async fn eviction_drops_least_recently_used() {
        let registry = PollerRegistry::new(EvictionPolicy::MaxEntries(2));
        let a = registry.get_or_create("A", || make_entry("A"));
        registry.get_or_create("B", || make_entry("B"));
        // Touch A so that B becomes the eviction candidate.
        registry.get_or_create("A", || make_entry("A"));
        registry.get_or_create("C", || make_entry("C"));

        assert_eq!(registry.keys(), vec!["A".to_string(), "C".to_string()]);
        assert!(!a.poller().is_stopped());
    }

    #[tokio::test]
    async fn evicted_entry_is_stopped() {
        let registry = PollerRegistry::new(EvictionPolicy::MaxEntries(1));
        let a = registry.get_or_create("A", || make_entry("A"));
        registry.get_or_create("B", || make_entry("B"));

        assert!(a.poller().is_stopped());
        assert_eq!(registry.keys(), vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn remove_and_stop_all() {
        let registry = PollerRegistry::new(EvictionPolicy::Never);
        let a = registry.get_or_create("A", || make_entry("A"));
        let b = registry.get_or_create("B", || make_entry("B"));

        assert!(registry.remove("A"));
        assert!(!registry.remove("A"));
        assert!(a.poller().is_stopped());

        registry.stop_all();
        assert!(registry.is_empty());
        assert!(b.poller().is_stopped());
        assert!(registry.get("B").is_none());
    }
}
