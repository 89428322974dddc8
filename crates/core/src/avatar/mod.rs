//! Avatar image cache.
//!
//! Images are stored as data URLs in the durable store, one entry per user.
//! Reads are stale-while-revalidate: an entry past its TTL is still served
//! while a background task refetches it. Users with nothing cacheable get a
//! generated SVG placeholder.

mod placeholder;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sessiongate_common::storage::{read_json, write_json};
use sessiongate_common::{Clock, KeyValueStore};
use tracing::{debug, warn};

pub use placeholder::{hue, initials, placeholder};

use crate::ports::ImageFetcher;
use crate::session::SessionManager;
use crate::user_info::UserInfo;

pub const AVATAR_KEY_PREFIX: &str = "avatar_cache_";
/// Key prefixes written by older releases, migrated on first read.
pub const LEGACY_KEY_PREFIXES: [&str; 2] = ["avatar_", "user_avatar_"];

const PRELOAD_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarEntry {
    pub user_id: String,
    pub data_url: String,
    #[serde(default)]
    pub original_url: Option<String>,
    /// Unix milliseconds of the fetch
    pub timestamp: u64,
}

pub fn cache_key(user_id: &str) -> String {
    format!("{AVATAR_KEY_PREFIX}{user_id}")
}

#[derive(Clone)]
pub struct AvatarCache {
    store: Arc<dyn KeyValueStore>,
    fetcher: Arc<dyn ImageFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl AvatarCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn ImageFetcher>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self { store, fetcher, clock, ttl }
    }

    /// Cache sharing the session's durable store, clock and avatar TTL.
    pub fn for_session(session: &SessionManager, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self::new(
            session.durable_store(),
            fetcher,
            session.clock(),
            session.config().timings.avatar_ttl(),
        )
    }

    /// Fetch `url` and store it for `user_id`.
    ///
    /// Returns the data URL even when it could not be persisted; `None` only
    /// when the fetch failed.
    pub async fn cache_avatar(&self, user_id: &str, url: &str) -> Option<String> {
        let image = match self.fetcher.fetch(url).await {
            Ok(image) => image,
            Err(err) => {
                warn!(user_id, error = %err, "avatar_fetch_failed");
                return None;
            }
        };

        let data_url = format!("data:{};base64,{}", image.content_type, STANDARD.encode(&image.bytes));
        let entry = AvatarEntry {
            user_id: user_id.to_string(),
            data_url: data_url.clone(),
            original_url: Some(url.to_string()),
            timestamp: self.clock.millis_since_epoch(),
        };
        self.persist(&entry);
        debug!(user_id, bytes = image.bytes.len(), "avatar_cached");
        Some(data_url)
    }

    /// Best image for the user, never failing.
    ///
    /// Fresh entries are returned as is. Stale entries are returned while a
    /// refetch runs in the background, using `url` or the entry's original
    /// URL. Without an entry, `url` is fetched inline; the placeholder covers
    /// everything else.
    pub async fn get_avatar(
        &self,
        user_id: &str,
        url: Option<&str>,
        info: Option<&UserInfo>,
    ) -> String {
        if let Some(entry) = self.cached(user_id) {
            if self.is_fresh(&entry) {
                return entry.data_url;
            }
            let refetch = url.map(str::to_string).or(entry.original_url);
            if let Some(refetch) = refetch {
                debug!(user_id, "avatar_stale_revalidating");
                let this = self.clone();
                let user_id = user_id.to_string();
                tokio::spawn(async move {
                    this.cache_avatar(&user_id, &refetch).await;
                });
                return entry.data_url;
            }
            debug!(user_id, "avatar_stale_without_source");
        } else if let Some(url) = url {
            if let Some(data_url) = self.cache_avatar(user_id, url).await {
                return data_url;
            }
        }
        placeholder(user_id, info)
    }

    /// Stored entry for `user_id`, migrating legacy keys on the way.
    pub fn cached(&self, user_id: &str) -> Option<AvatarEntry> {
        match read_json::<AvatarEntry>(self.store.as_ref(), &cache_key(user_id)) {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => self.migrate_legacy(user_id),
            Err(err) => {
                warn!(user_id, error = %err, "avatar_entry_unreadable");
                None
            }
        }
    }

    pub fn clear_cache(&self, user_id: &str) {
        let keys = std::iter::once(cache_key(user_id)).chain(legacy_keys(user_id));
        for key in keys {
            if let Err(err) = self.store.remove(&key) {
                warn!(key, error = %err, "avatar_entry_remove_failed");
            }
        }
    }

    /// Remove every avatar entry, canonical and legacy.
    pub fn clear_all_cache(&self) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "avatar_cache_list_failed");
                return;
            }
        };
        let mut removed = 0;
        for key in keys.iter().filter(|key| is_avatar_key(key)) {
            match self.store.remove(key) {
                Ok(()) => removed += 1,
                Err(err) => warn!(key, error = %err, "avatar_entry_remove_failed"),
            }
        }
        debug!(removed, "avatar_cache_cleared");
    }

    /// Cache every `(user_id, url)` pair whose entry is missing or stale,
    /// at most four fetches at a time. Returns how many were cached.
    pub async fn preload(&self, entries: Vec<(String, String)>) -> usize {
        let pending: Vec<_> = entries
            .into_iter()
            .filter(|(user_id, _)| !self.cached(user_id).is_some_and(|entry| self.is_fresh(&entry)))
            .collect();

        stream::iter(pending)
            .map(|(user_id, url)| async move { self.cache_avatar(&user_id, &url).await })
            .buffer_unordered(PRELOAD_CONCURRENCY)
            .filter(|cached| futures::future::ready(cached.is_some()))
            .count()
            .await
    }

    fn is_fresh(&self, entry: &AvatarEntry) -> bool {
        let ttl = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        self.clock.millis_since_epoch().saturating_sub(entry.timestamp) < ttl
    }

    fn persist(&self, entry: &AvatarEntry) {
        let key = cache_key(&entry.user_id);
        match write_json(self.store.as_ref(), &key, entry) {
            Ok(()) => {}
            Err(err) if err.is_quota() => {
                let evicted = self.evict_oldest_third();
                warn!(evicted, "avatar_cache_full_evicted_oldest");
                if let Err(err) = write_json(self.store.as_ref(), &key, entry) {
                    warn!(key, error = %err, "avatar_cache_write_failed_after_eviction");
                }
            }
            Err(err) => warn!(key, error = %err, "avatar_cache_write_failed"),
        }
    }

    /// Drop the oldest third of cached entries, rounding up.
    fn evict_oldest_third(&self) -> usize {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "avatar_cache_list_failed");
                return 0;
            }
        };

        let mut aged: Vec<(u64, String)> = keys
            .into_iter()
            .filter(|key| key.starts_with(AVATAR_KEY_PREFIX))
            .map(|key| {
                // Unreadable entries count as oldest
                let timestamp = read_json::<AvatarEntry>(self.store.as_ref(), &key)
                    .ok()
                    .flatten()
                    .map_or(0, |entry| entry.timestamp);
                (timestamp, key)
            })
            .collect();
        aged.sort();

        let count = aged.len().div_ceil(3);
        aged.into_iter()
            .take(count)
            .filter(|(_, key)| self.store.remove(key).is_ok())
            .count()
    }

    fn migrate_legacy(&self, user_id: &str) -> Option<AvatarEntry> {
        for key in legacy_keys(user_id) {
            let raw = match self.store.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(key, error = %err, "legacy_avatar_unreadable");
                    continue;
                }
            };

            let entry = serde_json::from_str::<AvatarEntry>(&raw).ok().or_else(|| {
                raw.starts_with("data:").then(|| AvatarEntry {
                    user_id: user_id.to_string(),
                    data_url: raw.clone(),
                    original_url: None,
                    timestamp: self.clock.millis_since_epoch(),
                })
            });
            if let Err(err) = self.store.remove(&key) {
                warn!(key, error = %err, "legacy_avatar_remove_failed");
            }

            if let Some(mut entry) = entry {
                entry.user_id = user_id.to_string();
                self.persist(&entry);
                debug!(user_id, legacy_key = key, "legacy_avatar_migrated");
                return Some(entry);
            }
        }
        None
    }
}

/// Legacy keys that could hold `user_id`'s avatar. A candidate that is
/// another user's canonical key (`avatar_` + `cache_bob`) is skipped.
fn legacy_keys(user_id: &str) -> impl Iterator<Item = String> + '_ {
    LEGACY_KEY_PREFIXES
        .iter()
        .map(move |prefix| format!("{prefix}{user_id}"))
        .filter(|key| !key.starts_with(AVATAR_KEY_PREFIX))
}

fn is_avatar_key(key: &str) -> bool {
    key.starts_with(AVATAR_KEY_PREFIX)
        || LEGACY_KEY_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

impl std::fmt::Debug for AvatarCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the avatar cache.

    use sessiongate_common::{MemoryStore, MockClock};

    use super::*;
    use crate::testing::MockImageFetcher;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    struct Harness {
        cache: AvatarCache,
        store: MemoryStore,
        clock: MockClock,
        fetcher: Arc<MockImageFetcher>,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let clock = MockClock::new();
        let fetcher = Arc::new(MockImageFetcher::new());
        let cache = AvatarCache::new(
            Arc::new(store.clone()),
            fetcher.clone(),
            Arc::new(clock.clone()),
            WEEK,
        );
        Harness { cache, store, clock, fetcher }
    }

    /// Validates `AvatarCache::cache_avatar` behavior for the fetch and
    /// persist scenario.
    ///
    /// Assertions:
    /// - Ensures the image is stored as a base64 data URL under the user id.
    #[tokio::test]
    async fn test_cache_avatar_stores_data_url() {
        let h = harness();
        h.fetcher.serve("https://img/u1", b"png-bytes", "image/png");

        let data_url = h.cache.cache_avatar("u1", "https://img/u1").await.unwrap();

        assert_eq!(data_url, format!("data:image/png;base64,{}", STANDARD.encode(b"png-bytes")));
        let entry = h.cache.cached("u1").unwrap();
        assert_eq!(entry.data_url, data_url);
        assert_eq!(entry.original_url.as_deref(), Some("https://img/u1"));
    }

    /// Validates `AvatarCache::cache_avatar` behavior for the full store
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the oldest third of entries is evicted.
    /// - Ensures the new entry is written after eviction.
    #[tokio::test]
    async fn test_quota_evicts_oldest_third() {
        let h = harness();
        for id in ["u1", "u2", "u3", "u4"] {
            h.fetcher.serve(&format!("https://img/{id}"), b"same-size", "image/png");
        }
        for id in ["u1", "u2", "u3"] {
            h.cache.cache_avatar(id, &format!("https://img/{id}")).await.unwrap();
            h.clock.advance(Duration::from_secs(1));
        }
        h.store.set_quota(Some(h.store.used_bytes()));

        let data_url = h.cache.cache_avatar("u4", "https://img/u4").await;

        assert!(data_url.is_some());
        assert!(h.cache.cached("u1").is_none());
        assert!(h.cache.cached("u2").is_some());
        assert!(h.cache.cached("u4").is_some());
    }

    /// Validates `AvatarCache::cache_avatar` behavior for the write failure
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the data URL is returned even when nothing was persisted.
    #[tokio::test]
    async fn test_unpersisted_avatar_still_returned() {
        let h = harness();
        h.fetcher.serve("https://img/u1", b"x", "image/gif");
        h.store.fail_next_writes(1);

        assert!(h.cache.cache_avatar("u1", "https://img/u1").await.is_some());
        assert!(h.cache.cached("u1").is_none());
    }

    /// Validates `AvatarCache::get_avatar` behavior for the stale entry
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the stale image is returned immediately.
    /// - Ensures a background refetch replaces it.
    #[tokio::test]
    async fn test_stale_entry_served_while_revalidating() {
        let h = harness();
        h.fetcher.serve("https://img/u1", b"old", "image/png");
        let old = h.cache.cache_avatar("u1", "https://img/u1").await.unwrap();
        h.fetcher.serve("https://img/u1", b"new", "image/png");
        h.clock.advance(WEEK + Duration::from_secs(1));

        let served = h.cache.get_avatar("u1", None, None).await;
        assert_eq!(served, old);

        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let refreshed = h.cache.cached("u1").unwrap();
        assert_eq!(refreshed.data_url, format!("data:image/png;base64,{}", STANDARD.encode(b"new")));
        assert_eq!(h.fetcher.calls(), 2);
    }

    /// Validates `AvatarCache::get_avatar` behavior for the nothing cacheable
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a failed fetch falls back to the placeholder.
    #[tokio::test]
    async fn test_missing_image_uses_placeholder() {
        let h = harness();
        let info = UserInfo {
            id: "u1".into(),
            username: "jdoe".into(),
            first_name: Some("John".into()),
            last_name: Some("Doe".into()),
            ..UserInfo::default()
        };

        let served = h.cache.get_avatar("u1", Some("https://img/missing"), Some(&info)).await;

        assert_eq!(served, placeholder("u1", Some(&info)));
    }

    /// Validates `AvatarCache::cached` behavior for the legacy key scenario.
    ///
    /// Assertions:
    /// - Ensures a legacy entry is moved to the canonical key.
    /// - Ensures the legacy key is deleted.
    #[test]
    fn test_legacy_entry_migrated() {
        let h = harness();
        h.store.set("user_avatar_u1", "data:image/png;base64,AAAA").unwrap();

        let entry = h.cache.cached("u1").unwrap();

        assert_eq!(entry.data_url, "data:image/png;base64,AAAA");
        assert_eq!(h.store.get("user_avatar_u1").unwrap(), None);
        assert!(h.store.get(&cache_key("u1")).unwrap().is_some());
    }

    /// Validates `AvatarCache::cached` behavior for a user id that extends
    /// another user's canonical key.
    ///
    /// Assertions:
    /// - Ensures `cache_bob` does not claim `bob`'s entry as legacy data.
    /// - Ensures clearing `cache_bob` leaves `bob`'s entry alone.
    #[tokio::test]
    async fn test_canonical_entry_never_treated_as_legacy() {
        let h = harness();
        h.fetcher.serve("https://img/bob", b"bob-png", "image/png");
        let bob = h.cache.cache_avatar("bob", "https://img/bob").await.unwrap();

        assert!(h.cache.cached("cache_bob").is_none());
        h.cache.clear_cache("cache_bob");

        assert_eq!(h.cache.cached("bob").map(|entry| entry.data_url), Some(bob));
    }

    /// Validates `AvatarCache::clear_all_cache` behavior for the mixed keys
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures canonical and legacy avatar keys are removed.
    /// - Ensures unrelated keys survive.
    #[tokio::test]
    async fn test_clear_all_cache_keeps_other_keys() {
        let h = harness();
        h.fetcher.serve("https://img/u1", b"x", "image/png");
        h.cache.cache_avatar("u1", "https://img/u1").await.unwrap();
        h.store.set("avatar_u2", "data:image/png;base64,AAAA").unwrap();
        h.store.set("auth_access_token", "token").unwrap();

        h.cache.clear_all_cache();

        assert_eq!(h.store.keys().unwrap(), vec!["auth_access_token".to_string()]);
    }

    /// Validates `AvatarCache::preload` behavior for the mixed freshness
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures only missing entries are fetched.
    #[tokio::test]
    async fn test_preload_skips_fresh_entries() {
        let h = harness();
        for id in ["u1", "u2", "u3"] {
            h.fetcher.serve(&format!("https://img/{id}"), b"x", "image/png");
        }
        h.cache.cache_avatar("u1", "https://img/u1").await.unwrap();

        let cached = h
            .cache
            .preload(
                ["u1", "u2", "u3"]
                    .iter()
                    .map(|id| (id.to_string(), format!("https://img/{id}")))
                    .collect(),
            )
            .await;

        assert_eq!(cached, 2);
        assert_eq!(h.fetcher.calls(), 3);
    }
}
