//! Cookie jar abstraction
//!
//! Tokens are mirrored into cookies so that server-visible requests carry
//! them. Cookie attributes differ by environment (production wants
//! `Secure` + a shared domain, previews run inside cross-site frames), so
//! every write takes a [`CookieOptions`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use ::time::Duration as CookieDuration;
use cookie::Cookie;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{StorageError, StorageResult};

/// `SameSite` attribute for token cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Strict => Self::Strict,
            SameSite::Lax => Self::Lax,
            SameSite::None => Self::None,
        }
    }
}

/// Attributes applied to every cookie write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
    pub expires_days: i64,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            secure: true,
            same_site: SameSite::Lax,
            expires_days: 7,
        }
    }
}

impl CookieOptions {
    /// Build a cookie carrying these attributes.
    pub fn build(&self, name: &str, value: &str) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .path(self.path.clone())
            .secure(self.secure)
            .same_site(self.same_site.into())
            .max_age(CookieDuration::days(self.expires_days));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    /// Build an already-expired cookie that deletes `name`.
    pub fn removal(&self, name: &str) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), ""))
            .path(self.path.clone())
            .max_age(CookieDuration::ZERO);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

/// A cookie backend.
pub trait CookieJar: Send + Sync {
    /// Read a cookie value.
    fn get(&self, name: &str) -> Option<String>;

    /// Write a cookie. Fails when the environment refuses cookies.
    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> StorageResult<()>;

    /// Delete a cookie.
    fn remove(&self, name: &str, options: &CookieOptions);
}

/// In-memory cookie jar.
///
/// [`MemoryCookieJar::block`] simulates browsers that silently drop cookies
/// (third-party frames, strict privacy modes).
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<HashMap<String, Cookie<'static>>>,
    blocked: AtomicBool,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or accept again) all writes.
    pub fn block(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Render the `Set-Cookie` header value last written for `name`.
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.cookies.read().get(name).map(ToString::to_string)
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .read()
            .get(name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> StorageResult<()> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("cookie '{name}' blocked")));
        }
        self.cookies.write().insert(name.to_string(), options.build(name, value));
        Ok(())
    }

    fn remove(&self, name: &str, options: &CookieOptions) {
        self.cookies.write().insert(name.to_string(), options.removal(name));
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::cookies.
    use super::*;

    /// Validates `CookieOptions::build` for the production attributes
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the rendered header carries `Secure`, `SameSite` and domain.
    #[test]
    fn test_cookie_attributes_rendered() {
        let jar = MemoryCookieJar::new();
        let options = CookieOptions {
            domain: Some("example.com".to_string()),
            same_site: SameSite::Strict,
            ..CookieOptions::default()
        };

        jar.set("access_token", "abc", &options).unwrap();

        let header = jar.header_value("access_token").unwrap();
        assert!(header.starts_with("access_token=abc"));
        assert!(header.contains("Secure"));
        assert!(header.contains("SameSite=Strict"));
        assert!(header.contains("Domain=example.com"));
        assert!(header.contains("Path=/"));
    }

    /// Validates `MemoryCookieJar::block` for the cookie-restricted scenario.
    ///
    /// Assertions:
    /// - Ensures writes fail and nothing is stored.
    #[test]
    fn test_blocked_jar_rejects_writes() {
        let jar = MemoryCookieJar::new();
        jar.block(true);

        assert!(jar.set("access_token", "abc", &CookieOptions::default()).is_err());
        assert_eq!(jar.get("access_token"), None);
    }

    /// Validates `MemoryCookieJar::remove` deletes the cookie.
    #[test]
    fn test_remove() {
        let jar = MemoryCookieJar::new();
        let options = CookieOptions::default();
        jar.set("refresh_token", "r", &options).unwrap();

        jar.remove("refresh_token", &options);

        assert_eq!(jar.get("refresh_token"), None);
        assert!(jar.header_value("refresh_token").unwrap().contains("Max-Age=0"));
    }
}
