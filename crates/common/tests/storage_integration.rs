//! Integration tests for the storage layer
//!
//! Exercises the in-memory store the way several contexts (tabs) share it:
//! one context writes, another observes the change event.

use sessiongate_common::storage::{read_json, write_json};
use sessiongate_common::{
    CookieJar, CookieOptions, KeyValueStore, MemoryCookieJar, MemoryStore, StorageError,
};

/// Two contexts sharing a store observe each other's writes.
///
/// # Test Steps
/// 1. Context A subscribes to change events
/// 2. Context B writes and then removes a token
/// 3. Context A reads the shared value and receives both events
#[tokio::test]
async fn test_contexts_share_state_and_events() {
    let tab_a = MemoryStore::new();
    let tab_b = tab_a.clone();
    let mut events = tab_a.subscribe();

    tab_b.set("auth_access_token", "token-from-b").unwrap();
    assert_eq!(tab_a.get("auth_access_token").unwrap().as_deref(), Some("token-from-b"));

    tab_b.remove("auth_access_token").unwrap();

    let write = events.recv().await.unwrap();
    assert_eq!(write.key.as_deref(), Some("auth_access_token"));
    assert_eq!(write.new_value.as_deref(), Some("token-from-b"));

    let removal = events.recv().await.unwrap();
    assert_eq!(removal.old_value.as_deref(), Some("token-from-b"));
    assert!(removal.new_value.is_none());
}

/// JSON helpers round-trip structured values and surface malformed data.
#[test]
fn test_json_helpers() {
    let store = MemoryStore::new();

    write_json(&store, "numbers", &vec![1, 2, 3]).unwrap();
    let numbers: Option<Vec<i32>> = read_json(&store, "numbers").unwrap();
    assert_eq!(numbers, Some(vec![1, 2, 3]));

    store.set("broken", "{not json").unwrap();
    let broken: Result<Option<Vec<i32>>, _> = read_json(&store, "broken");
    assert!(matches!(broken, Err(StorageError::Serialization(_))));

    let missing: Option<Vec<i32>> = read_json(&store, "missing").unwrap();
    assert!(missing.is_none());
}

/// A blocked cookie jar does not affect the durable store.
#[test]
fn test_blocked_cookies_leave_store_untouched() {
    let store = MemoryStore::new();
    let jar = MemoryCookieJar::new();
    jar.block(true);

    store.set("auth_access_token", "abc").unwrap();
    let cookie = jar.set("access_token", "abc", &CookieOptions::default());

    assert!(cookie.is_err());
    assert_eq!(store.get("auth_access_token").unwrap().as_deref(), Some("abc"));
}
