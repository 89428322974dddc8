//! In-memory [`KeyValueStore`] with quota simulation and change broadcasts.
//!
//! A single `MemoryStore` shared (via `Clone`) between several services
//! behaves like browser storage shared by several tabs: every mutation is
//! published on a broadcast channel that other contexts can subscribe to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

use super::{KeyValueStore, StorageError, StorageEvent, StorageResult};

const EVENT_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Mutex<Option<usize>>,
    failing_writes: AtomicUsize,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                quota_bytes: Mutex::new(None),
                failing_writes: AtomicUsize::new(0),
                events,
            }),
        }
    }

    /// Create a store that rejects writes once keys plus values exceed
    /// `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        let store = Self::new();
        store.set_quota(Some(bytes));
        store
    }

    /// Change (or lift) the byte quota.
    pub fn set_quota(&self, bytes: Option<usize>) {
        *self.inner.quota_bytes.lock() = bytes;
    }

    /// Make the next `count` writes fail with [`StorageError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Subscribe to mutations made through any clone of this store.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.events.subscribe()
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.inner.entries.read().iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn publish(&self, event: StorageEvent) {
        // No subscribers is the normal case outside of multi-context setups
        let _ = self.inner.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.len())
            .field("quota_bytes", &*self.inner.quota_bytes.lock())
            .finish()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.inner.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if self.take_injected_failure() {
            return Err(StorageError::Unavailable(format!("write to '{key}' rejected")));
        }

        let old_value = {
            let mut entries = self.inner.entries.write();
            if let Some(limit) = *self.inner.quota_bytes.lock() {
                let current: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
                let replaced = entries.get(key).map_or(0, |old| key.len() + old.len());
                if current - replaced + key.len() + value.len() > limit {
                    trace!(key, limit, "memory store quota exceeded");
                    return Err(StorageError::QuotaExceeded { key: key.to_string() });
                }
            }
            entries.insert(key.to_string(), value.to_string())
        };

        self.publish(StorageEvent {
            key: Some(key.to_string()),
            old_value,
            new_value: Some(value.to_string()),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let old_value = self.inner.entries.write().remove(key);
        if old_value.is_some() {
            self.publish(StorageEvent { key: Some(key.to_string()), old_value, new_value: None });
        }
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.inner.entries.read().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.inner.entries.write().clear();
        self.publish(StorageEvent { key: None, old_value: None, new_value: None });
        Ok(())
    }
}
