//! Session configuration types.
//!
//! Loading (environment, files) lives in `sessiongate-infra`; this module
//! only defines the shape and the defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessiongate_common::CookieOptions;

use crate::error::{AuthError, AuthResult};
use crate::lock::LockName;

/// Everything the session layer needs to talk to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identity provider base URL, e.g. `https://door.example.com`
    pub server_url: String,
    pub client_id: String,
    pub app_name: String,
    pub organization_name: String,
    /// Origin of this application, used to build the redirect URI
    pub app_origin: String,
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
    /// Authorization API consulted by remote validation
    #[serde(default)]
    pub validate_url: Option<String>,
    #[serde(default)]
    pub cookies: CookieOptions,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub locks: LockTimeouts,
}

fn default_redirect_path() -> String {
    "/callback".to_string()
}

impl SessionConfig {
    pub fn new(
        server_url: impl Into<String>,
        client_id: impl Into<String>,
        app_origin: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            client_id: client_id.into(),
            app_name: String::new(),
            organization_name: String::new(),
            app_origin: app_origin.into(),
            redirect_path: default_redirect_path(),
            validate_url: None,
            cookies: CookieOptions::default(),
            timings: Timings::default(),
            locks: LockTimeouts::default(),
        }
    }

    /// Full redirect URI registered with the identity provider.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.app_origin.trim_end_matches('/'), self.redirect_path)
    }

    /// Identity provider base URL without a trailing slash.
    pub fn server_base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Check required fields.
    pub fn validate(&self) -> AuthResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(AuthError::Config("server_url must not be empty".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config("client_id must not be empty".into()));
        }
        if !self.redirect_path.starts_with('/') {
            return Err(AuthError::Config(format!(
                "redirect_path must start with '/': {}",
                self.redirect_path
            )));
        }
        Ok(())
    }
}

/// Time windows used by the session layer, in seconds unless noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Refresh is scheduled this long before `exp`
    pub refresh_lead_secs: u64,
    /// Tokens expiring sooner than this are refreshed proactively
    pub refresh_window_secs: u64,
    /// Validation is skipped this long after an auth callback
    pub callback_trust_secs: u64,
    /// Tokens must outlive now by more than this to count as valid
    pub expiry_skew_secs: u64,
    pub team_cache_secs: u64,
    pub periodic_check_secs: u64,
    /// A validation newer than this lets the periodic check skip
    pub recent_validation_secs: u64,
    pub user_info_ttl_secs: u64,
    pub avatar_ttl_secs: u64,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    /// Attempts for a refresh that fails with a transient error
    pub refresh_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            refresh_lead_secs: 5 * 60,
            refresh_window_secs: 10 * 60,
            callback_trust_secs: 10 * 60,
            expiry_skew_secs: 30,
            team_cache_secs: 60,
            periodic_check_secs: 5 * 60,
            recent_validation_secs: 5 * 60,
            user_info_ttl_secs: 24 * 60 * 60,
            avatar_ttl_secs: 7 * 24 * 60 * 60,
            poll_attempts: 5,
            poll_interval_ms: 1000,
            refresh_attempts: 2,
        }
    }
}

impl Timings {
    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn callback_trust(&self) -> Duration {
        Duration::from_secs(self.callback_trust_secs)
    }

    pub fn team_cache(&self) -> Duration {
        Duration::from_secs(self.team_cache_secs)
    }

    pub fn periodic_check(&self) -> Duration {
        Duration::from_secs(self.periodic_check_secs)
    }

    pub fn recent_validation(&self) -> Duration {
        Duration::from_secs(self.recent_validation_secs)
    }

    pub fn user_info_ttl(&self) -> Duration {
        Duration::from_secs(self.user_info_ttl_secs)
    }

    pub fn avatar_ttl(&self) -> Duration {
        Duration::from_secs(self.avatar_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Staleness timeout per named lock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockTimeouts {
    pub signin_secs: u64,
    pub refresh_secs: u64,
    pub local_validation_secs: u64,
    pub user_info_secs: u64,
    pub team_validation_secs: u64,
}

impl Default for LockTimeouts {
    fn default() -> Self {
        Self {
            signin_secs: 20,
            refresh_secs: 10,
            local_validation_secs: 15,
            user_info_secs: 10,
            team_validation_secs: 10,
        }
    }
}

impl LockTimeouts {
    pub fn timeout(&self, name: LockName) -> Duration {
        let secs = match name {
            LockName::Signin => self.signin_secs,
            LockName::Refresh => self.refresh_secs,
            LockName::LocalValidation => self.local_validation_secs,
            LockName::UserInfoRefresh => self.user_info_secs,
            LockName::TeamValidation => self.team_validation_secs,
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_uri_joins_origin_and_path() {
        let config = SessionConfig::new("https://door.example.com/", "app", "https://app.example.com/");
        assert_eq!(config.redirect_uri(), "https://app.example.com/callback");
        assert_eq!(config.server_base(), "https://door.example.com");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let config = SessionConfig::new("", "app", "https://app.example.com");
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let mut config = SessionConfig::new("https://door", "app", "https://app");
        config.redirect_path = "callback".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_lock_timeouts() {
        let timeouts = LockTimeouts::default();
        assert_eq!(timeouts.timeout(LockName::Signin), Duration::from_secs(20));
        assert_eq!(timeouts.timeout(LockName::Refresh), Duration::from_secs(10));
        assert_eq!(timeouts.timeout(LockName::LocalValidation), Duration::from_secs(15));
        assert_eq!(timeouts.timeout(LockName::UserInfoRefresh), Duration::from_secs(10));
        assert_eq!(timeouts.timeout(LockName::TeamValidation), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{
                "server_url": "https://door.example.com",
                "client_id": "abc",
                "app_name": "portal",
                "organization_name": "acme",
                "app_origin": "https://portal.example.com",
                "timings": { "refresh_lead_secs": 120 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.redirect_path, "/callback");
        assert_eq!(config.timings.refresh_lead_secs, 120);
        assert_eq!(config.timings.refresh_window_secs, 600);
        assert_eq!(config.locks, LockTimeouts::default());
    }
}
