//! Integration tests for contexts sharing one durable store
//!
//! Each `SessionFixture::sibling` behaves like another tab: same durable
//! store and provider, its own ephemeral store and session manager.

use std::time::Duration;

use sessiongate_core::testing::SessionFixture;
use sessiongate_core::{SessionEvent, SessionState};
use tokio::sync::broadcast;

async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("no session event within a second")
        .expect("session event channel closed")
}

/// A login in one context is adopted by the other, and so is the logout.
///
/// # Test Steps
/// 1. Context B listens to the shared store
/// 2. Context A signs in; B reports `TokenChanged` with the same token
/// 3. Context A logs out; B reports `LoggedOut` and is anonymous
#[tokio::test]
async fn test_login_and_logout_propagate() {
    let tab_a = SessionFixture::new();
    let tab_b = tab_a.sibling();
    let listener = tab_b.session.spawn_storage_listener(tab_b.durable.subscribe());
    let mut b_events = tab_b.session.subscribe();

    tab_a.session.start_login(None).unwrap();
    tab_a.session.signin_with_code("code-1", "mock-state").await.unwrap();

    assert_eq!(next_event(&mut b_events).await, SessionEvent::TokenChanged);
    assert_eq!(tab_b.session.state(), SessionState::Authenticated);
    assert_eq!(tab_b.session.access_token(), tab_a.session.access_token());
    assert!(tab_b.session.is_logged_in());

    tab_a.session.logout().await;

    assert_eq!(next_event(&mut b_events).await, SessionEvent::LoggedOut);
    assert_eq!(tab_b.session.state(), SessionState::Anonymous);
    assert!(!tab_b.session.has_pending_timers());
    listener.abort();
}

/// A refresh in one context replaces the token the other one uses.
#[tokio::test]
async fn test_refresh_propagates() {
    let tab_a = SessionFixture::new();
    let tab_b = tab_a.sibling();
    tab_a.seed_tokens(120);
    let listener = tab_b.session.spawn_storage_listener(tab_b.durable.subscribe());
    let mut b_events = tab_b.session.subscribe();

    let pair = tab_a.session.refresh_access_token().await.unwrap();

    assert_eq!(next_event(&mut b_events).await, SessionEvent::TokenChanged);
    assert_eq!(tab_b.session.access_token(), Some(pair.access_token));
    listener.abort();
}

/// Storage events for unrelated keys leave the session alone.
#[tokio::test]
async fn test_unrelated_keys_ignored() {
    use sessiongate_common::{KeyValueStore, StorageEvent};

    let tab = SessionFixture::new();
    tab.seed_tokens(3600);
    let mut events = tab.session.subscribe();

    tab.durable.set("theme", "dark").unwrap();
    tab.session.handle_storage_event(&StorageEvent {
        key: Some("theme".into()),
        old_value: None,
        new_value: Some("dark".into()),
    });

    assert_eq!(tab.session.state(), SessionState::Anonymous);
    assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
}
