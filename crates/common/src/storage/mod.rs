//! Key-value storage contracts
//!
//! SessionGate never talks to a concrete storage engine. Services receive
//! [`KeyValueStore`] instances for the two lifetimes they care about:
//!
//! ```text
//!   durable store    survives restarts, shared by every context (tab)
//!   ephemeral store  scoped to one session, wiped on logout
//!   cookie jar       mirrors tokens for server-visible requests
//! ```
//!
//! Reads and writes are synchronous, matching browser storage, but every call
//! is fallible: quota and privacy restrictions surface as [`StorageError`].

pub mod cookies;
pub mod error;
#[cfg(feature = "runtime")]
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use cookies::{CookieJar, CookieOptions, MemoryCookieJar, SameSite};
pub use error::{StorageError, StorageResult};
#[cfg(feature = "runtime")]
pub use memory::MemoryStore;

/// Synchronous string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// List every key currently stored.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Remove every key.
    fn clear(&self) -> StorageResult<()>;
}

/// Change notification broadcast to every context sharing a store.
///
/// `key` is `None` when the whole store was cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Read and deserialize a JSON value.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize a value as JSON and write it.
pub fn write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> StorageResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}
