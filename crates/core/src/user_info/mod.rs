//! User profile cache.
//!
//! Lookup order: memory, the durable store (24h by default), then the
//! profile endpoints in [`ProfileEndpoint::FALLBACK_ORDER`]. Whatever the
//! endpoints leave empty is filled from the access token's claims, and when
//! every endpoint fails the claims alone are returned.
//!
//! Both cache layers are tagged with the fingerprint of the token they were
//! fetched under and are ignored once the session holds a different token.

mod types;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sessiongate_common::storage::{read_json, write_json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use types::{
    looks_like_silent_auth_failure, AccountUser, OidcUserInfo, ProfileEnvelope, UserInfo,
};

use crate::codec::Claims;
use crate::error::{AuthError, AuthResult};
use crate::lock::LockName;
use crate::ports::{ProfileEndpoint, ProfileSource};
use crate::session::{fingerprint, SessionEvent, SessionManager};

/// Durable-store key of the persisted profile.
pub const USER_INFO_KEY: &str = "auth_user_info";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedUserInfo {
    info: UserInfo,
    /// Unix milliseconds
    cached_at: u64,
    #[serde(default)]
    token_fingerprint: Option<String>,
}

pub struct UserInfoCache {
    session: SessionManager,
    source: Arc<dyn ProfileSource>,
    /// Profile and the fingerprint of the token it belongs to
    memory: Mutex<Option<(String, UserInfo)>>,
}

impl UserInfoCache {
    pub fn new(session: SessionManager, source: Arc<dyn ProfileSource>) -> Self {
        Self { session, source, memory: Mutex::new(None) }
    }

    /// Current user's profile. `force` skips both cache layers.
    pub async fn get(&self, force: bool) -> AuthResult<UserInfo> {
        if !force {
            if let Some(info) = self.cached() {
                return Ok(info);
            }
        }

        let token = self.session.access_token().ok_or(AuthError::NoToken)?;
        let claims = self.session.decode(&token).map(|decoded| decoded.claims()).unwrap_or_default();
        let basic = UserInfo::from_claims(&claims);

        let locks = self.session.locks();
        if !locks.acquire(LockName::UserInfoRefresh) {
            debug!("user_info_refresh_in_progress_elsewhere");
            return basic.ok_or_else(|| {
                AuthError::ProfileUnavailable("profile refresh running in another context".into())
            });
        }
        let remote = self.fetch_remote(&token, &claims).await;
        locks.release(LockName::UserInfoRefresh);

        let info = match (remote, basic) {
            (Some(remote), Some(basic)) => remote.merge_missing(&basic),
            (Some(remote), None) => remote,
            (None, Some(basic)) => {
                warn!("profile_endpoints_failed_using_token_claims");
                return Ok(basic);
            }
            (None, None) => {
                return Err(AuthError::ProfileUnavailable(
                    "no endpoint answered and the token names no user".into(),
                ))
            }
        };

        // Skip persisting a profile for a session that changed meanwhile
        if self.session.access_token().as_deref() == Some(token.as_str()) {
            self.remember(&token, &info);
        }
        Ok(info)
    }

    /// Cached profile, else the one derivable from the token. Never touches
    /// the network.
    pub fn cached_or_basic(&self) -> Option<UserInfo> {
        self.cached().or_else(|| {
            let token = self.session.access_token()?;
            UserInfo::from_claims(&self.session.decode(&token)?.claims())
        })
    }

    /// Drop both cache layers.
    pub fn invalidate(&self) {
        self.memory.lock().take();
        if let Err(err) = self.session.durable_store().remove(USER_INFO_KEY) {
            warn!(error = %err, "user_info_cache_clear_failed");
        }
    }

    /// Invalidate whenever the session's token changes or it logs out.
    pub fn watch(self: &Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::TokenChanged | SessionEvent::LoggedOut) => {
                        let Some(cache) = weak.upgrade() else {
                            break;
                        };
                        cache.invalidate();
                    }
                    Ok(SessionEvent::InvalidAuth { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(cache) = weak.upgrade() {
                            cache.invalidate();
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn cached(&self) -> Option<UserInfo> {
        let current = fingerprint(&self.session.access_token()?);
        {
            let mut memory = self.memory.lock();
            if let Some((print, info)) = memory.as_ref() {
                if *print == current {
                    return Some(info.clone());
                }
                debug!("user_info_cache_token_changed");
            }
            *memory = None;
        }

        let info = self.persisted(&current)?;
        *self.memory.lock() = Some((current, info.clone()));
        Some(info)
    }

    fn persisted(&self, current: &str) -> Option<UserInfo> {
        let store = self.session.durable_store();
        let entry: CachedUserInfo = match read_json(store.as_ref(), USER_INFO_KEY) {
            Ok(entry) => entry?,
            Err(err) => {
                warn!(error = %err, "user_info_cache_unreadable");
                return None;
            }
        };

        if entry.token_fingerprint.as_deref() != Some(current) {
            debug!("user_info_cache_other_token");
            return None;
        }

        let ttl = u64::try_from(self.session.config().timings.user_info_ttl().as_millis()).ok()?;
        let age = self.session.clock().millis_since_epoch().saturating_sub(entry.cached_at);
        if age >= ttl {
            debug!(age_ms = age, "user_info_cache_expired");
            return None;
        }
        Some(entry.info)
    }

    fn remember(&self, token: &str, info: &UserInfo) {
        let print = fingerprint(token);
        *self.memory.lock() = Some((print.clone(), info.clone()));
        let entry = CachedUserInfo {
            info: info.clone(),
            cached_at: self.session.clock().millis_since_epoch(),
            token_fingerprint: Some(print),
        };
        if let Err(err) = write_json(self.session.durable_store().as_ref(), USER_INFO_KEY, &entry) {
            warn!(error = %err, "user_info_cache_write_failed");
        }
    }

    async fn fetch_remote(&self, token: &str, claims: &Claims) -> Option<UserInfo> {
        for endpoint in ProfileEndpoint::FALLBACK_ORDER {
            match self.source.fetch(endpoint, token, claims).await {
                Ok(envelope) => match envelope.normalize() {
                    Some(info) => {
                        info!(endpoint = endpoint.as_str(), "user_info_fetched");
                        return Some(info);
                    }
                    None => debug!(endpoint = endpoint.as_str(), "profile_endpoint_named_no_user"),
                },
                Err(AuthError::Unauthorized(message)) => {
                    warn!(endpoint = endpoint.as_str(), %message, "profile_fetch_unauthorized");
                    return None;
                }
                Err(err) => debug!(endpoint = endpoint.as_str(), error = %err, "profile_endpoint_failed"),
            }
        }
        None
    }
}

impl std::fmt::Debug for UserInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInfoCache").field("cached", &self.memory.lock().is_some()).finish()
    }
}
