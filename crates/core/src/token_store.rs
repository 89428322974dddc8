//! Token persistence across the durable store and the cookie jar.
//!
//! The durable store is the source of truth. Cookies are a mirror for
//! server-visible requests and may be refused by the environment (cross-site
//! frames, strict privacy modes); losing them must never lose the session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sessiongate_common::{CookieJar, CookieOptions, KeyValueStore};
use tracing::{debug, warn};

use crate::error::AuthResult;
use crate::user_info::USER_INFO_KEY;

pub const ACCESS_TOKEN_KEY: &str = "auth_access_token";
pub const REFRESH_TOKEN_KEY: &str = "auth_refresh_token";
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Access and refresh token as issued by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds as reported by the token endpoint
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Clone)]
pub struct TokenStore {
    durable: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn CookieJar>,
    cookie_options: CookieOptions,
}

impl TokenStore {
    pub fn new(
        durable: Arc<dyn KeyValueStore>,
        cookies: Arc<dyn CookieJar>,
        cookie_options: CookieOptions,
    ) -> Self {
        Self { durable, cookies, cookie_options }
    }

    /// Write the durable store, then mirror into cookies.
    ///
    /// Only a durable-store failure is an error.
    pub fn save(&self, pair: &TokenPair) -> AuthResult<()> {
        self.durable.set(ACCESS_TOKEN_KEY, &pair.access_token)?;
        match &pair.refresh_token {
            Some(refresh) => self.durable.set(REFRESH_TOKEN_KEY, refresh)?,
            None => self.durable.remove(REFRESH_TOKEN_KEY)?,
        }

        self.mirror(ACCESS_TOKEN_COOKIE, &pair.access_token);
        match &pair.refresh_token {
            Some(refresh) => {
                self.mirror(REFRESH_TOKEN_COOKIE, refresh);
            }
            // A stale cookie would otherwise resurface through `read_refresh`.
            None => self.cookies.remove(REFRESH_TOKEN_COOKIE, &self.cookie_options),
        }
        Ok(())
    }

    /// Current access token, durable store first.
    pub fn read(&self) -> Option<String> {
        self.read_either(ACCESS_TOKEN_KEY, ACCESS_TOKEN_COOKIE)
    }

    pub fn read_refresh(&self) -> Option<String> {
        self.read_either(REFRESH_TOKEN_KEY, REFRESH_TOKEN_COOKIE)
    }

    pub fn read_pair(&self) -> Option<TokenPair> {
        let access_token = self.read()?;
        Some(TokenPair { access_token, refresh_token: self.read_refresh(), expires_in: None })
    }

    /// Copy durable tokens into empty cookies. Returns true if anything was
    /// restored.
    pub fn restore_backup(&self) -> bool {
        let mut restored = false;
        for (key, cookie) in
            [(ACCESS_TOKEN_KEY, ACCESS_TOKEN_COOKIE), (REFRESH_TOKEN_KEY, REFRESH_TOKEN_COOKIE)]
        {
            if self.cookies.get(cookie).is_some() {
                continue;
            }
            if let Some(value) = self.read_durable(key) {
                restored |= self.mirror(cookie, &value);
            }
        }
        if restored {
            debug!("token_cookies_restored_from_backup");
        }
        restored
    }

    /// Remove tokens from both backends along with the derived user-info
    /// cache.
    pub fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_INFO_KEY] {
            if let Err(err) = self.durable.remove(key) {
                warn!(key, error = %err, "token_store_remove_failed");
            }
        }
        for cookie in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
            self.cookies.remove(cookie, &self.cookie_options);
        }
    }

    fn read_either(&self, key: &str, cookie: &str) -> Option<String> {
        self.read_durable(key).or_else(|| self.cookies.get(cookie).filter(|value| !value.is_empty()))
    }

    fn read_durable(&self, key: &str) -> Option<String> {
        match self.durable.get(key) {
            Ok(value) => value.filter(|value| !value.is_empty()),
            Err(err) => {
                warn!(key, error = %err, "token_store_read_failed");
                None
            }
        }
    }

    fn mirror(&self, cookie: &str, value: &str) -> bool {
        match self.cookies.set(cookie, value, &self.cookie_options) {
            Ok(()) => true,
            Err(err) => {
                warn!(cookie, error = %err, "token_cookie_write_failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").field("cookie_options", &self.cookie_options).finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for token_store.
    use sessiongate_common::{MemoryCookieJar, MemoryStore};

    use super::*;

    fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(3600),
        }
    }

    fn store() -> (TokenStore, MemoryStore, Arc<MemoryCookieJar>) {
        let durable = MemoryStore::new();
        let jar = Arc::new(MemoryCookieJar::new());
        let tokens = TokenStore::new(Arc::new(durable.clone()), jar.clone(), CookieOptions::default());
        (tokens, durable, jar)
    }

    /// Validates `TokenStore::save` writes both backends.
    ///
    /// Assertions:
    /// - Confirms durable keys and cookies carry the same tokens.
    #[test]
    fn test_save_writes_both_backends() {
        let (tokens, durable, jar) = store();

        tokens.save(&pair("access-1", Some("refresh-1"))).unwrap();

        assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("access-1"));
        assert_eq!(durable.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("refresh-1"));
        assert_eq!(jar.get(ACCESS_TOKEN_COOKIE).as_deref(), Some("access-1"));
        assert_eq!(tokens.read_pair().unwrap(), TokenPair { expires_in: None, ..pair("access-1", Some("refresh-1")) });
    }

    /// Validates `TokenStore::save` behavior for a pair issued without a
    /// refresh token.
    ///
    /// Assertions:
    /// - Ensures the previous refresh token is gone from both backends.
    #[test]
    fn test_save_without_refresh_drops_previous_refresh() {
        let (tokens, _, jar) = store();
        tokens.save(&pair("access-1", Some("refresh-old"))).unwrap();

        tokens.save(&pair("access-2", None)).unwrap();

        assert_eq!(tokens.read_refresh(), None);
        assert_eq!(jar.get(REFRESH_TOKEN_COOKIE), None);
        assert_eq!(tokens.read().as_deref(), Some("access-2"));
    }

    /// Validates `TokenStore::save` when cookies are blocked.
    ///
    /// Assertions:
    /// - Ensures the save still succeeds and reads come from the durable store.
    #[test]
    fn test_blocked_cookies_are_not_fatal() {
        let (tokens, _, jar) = store();
        jar.block(true);

        tokens.save(&pair("access-1", None)).unwrap();

        assert_eq!(tokens.read().as_deref(), Some("access-1"));
        assert_eq!(jar.get(ACCESS_TOKEN_COOKIE), None);
    }

    /// Validates `TokenStore::read` falls back to the cookie backend.
    #[test]
    fn test_read_falls_back_to_cookie() {
        let (tokens, _, jar) = store();
        jar.set(ACCESS_TOKEN_COOKIE, "from-cookie", &CookieOptions::default()).unwrap();

        assert_eq!(tokens.read().as_deref(), Some("from-cookie"));
        assert_eq!(tokens.read_refresh(), None);
    }

    /// Validates `TokenStore::restore_backup` for the cookie recovery
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures cookies are repopulated once they are accepted again.
    /// - Ensures a second restore is a no-op.
    #[test]
    fn test_restore_backup_repopulates_cookies() {
        let (tokens, _, jar) = store();
        jar.block(true);
        tokens.save(&pair("access-1", Some("refresh-1"))).unwrap();
        jar.block(false);

        assert!(tokens.restore_backup());
        assert_eq!(jar.get(ACCESS_TOKEN_COOKIE).as_deref(), Some("access-1"));
        assert_eq!(jar.get(REFRESH_TOKEN_COOKIE).as_deref(), Some("refresh-1"));
        assert!(!tokens.restore_backup());
    }

    /// Validates `TokenStore::clear` removes tokens and derived caches.
    #[test]
    fn test_clear_removes_everything() {
        let (tokens, durable, jar) = store();
        tokens.save(&pair("access-1", Some("refresh-1"))).unwrap();
        durable.set(USER_INFO_KEY, "{}").unwrap();

        tokens.clear();

        assert_eq!(tokens.read(), None);
        assert_eq!(tokens.read_refresh(), None);
        assert_eq!(durable.get(USER_INFO_KEY).unwrap(), None);
        assert_eq!(jar.get(ACCESS_TOKEN_COOKIE), None);
    }

    /// Validates `TokenStore::save` surfaces durable quota failures.
    #[test]
    fn test_durable_failure_is_an_error() {
        let durable = MemoryStore::with_quota(8);
        let tokens = TokenStore::new(
            Arc::new(durable),
            Arc::new(MemoryCookieJar::new()),
            CookieOptions::default(),
        );

        let err = tokens.save(&pair("a-very-long-access-token", None)).unwrap_err();
        assert_eq!(err, crate::AuthError::StorageQuotaExceeded);
    }
}
