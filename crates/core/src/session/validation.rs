//! Validation tiers and the periodic auth check.
//!
//! Three tiers, cheapest first:
//!
//! 1. [`SessionManager::is_token_valid_without_refresh`]: synchronous, trust
//!    flags then `exp`
//! 2. [`SessionManager::validate_local_token`]: may refresh or invalidate
//! 3. [`SessionManager::validate_with_team_api`]: remote authorization,
//!    cached per token

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sessiongate_common::time::timer;
use tracing::{debug, info, warn};

use super::manager::SessionManager;
use super::state::CheckOutcome;
use crate::error::{AuthError, AuthResult};
use crate::flags::{TrustFlag, TrustLevel};
use crate::lock::LockName;
use crate::ports::TeamValidation;

const FINGERPRINT_EDGE: usize = 10;

pub(super) struct CachedValidation {
    fingerprint: String,
    checked_at_ms: u64,
    result: TeamValidation,
}

/// Short identifier for a token: its first and last ten characters.
///
/// Tokens of twenty characters or fewer are their own fingerprint.
pub fn fingerprint(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= FINGERPRINT_EDGE * 2 {
        return token.to_string();
    }
    let head: String = chars[..FINGERPRINT_EDGE].iter().collect();
    let tail: String = chars[chars.len() - FINGERPRINT_EDGE..].iter().collect();
    format!("{head}:{tail}")
}

/// Clears the in-progress flag however the check ends.
struct CheckGuard<'a>(&'a AtomicBool);

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionManager {
    /// Effective trust, healing flags that outlived their token.
    pub fn trust_level(&self) -> TrustLevel {
        let level = self.inner.flags.trust_level();
        if level != TrustLevel::None && self.inner.tokens.read().is_none() {
            debug!(?level, "trust_flags_without_token_cleared");
            self.inner.flags.clear_all();
            self.inner.flags.clear(TrustFlag::AuthCallbackTime);
            return TrustLevel::None;
        }
        level
    }

    /// Tier 1: no I/O beyond the local stores.
    pub fn is_token_valid_without_refresh(&self) -> bool {
        let level = self.trust_level();
        let Some(token) = self.inner.tokens.read() else {
            return false;
        };
        if level.skips_validation() {
            return true;
        }
        self.is_unexpired(&token)
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_token_valid_without_refresh()
    }

    /// Tier 2: refreshes a token close to expiry and invalidates the session
    /// when the token is expired or unreadable.
    ///
    /// When another context holds the validation lock, only the `exp` check
    /// runs.
    pub async fn validate_local_token(&self) -> bool {
        let level = self.trust_level();
        let Some(token) = self.inner.tokens.read() else {
            return false;
        };
        if level.skips_validation() {
            return true;
        }

        if !self.inner.locks.acquire(LockName::LocalValidation) {
            debug!("local_validation_in_progress_elsewhere");
            return self.is_unexpired(&token);
        }
        let valid = self.validate_locked(&token).await;
        self.inner.locks.release(LockName::LocalValidation);
        valid
    }

    /// Alias kept for callers that only ask "is the token good".
    pub async fn is_token_valid(&self) -> bool {
        self.validate_local_token().await
    }

    async fn validate_locked(&self, token: &str) -> bool {
        let Some(remaining) = self.seconds_remaining(token) else {
            self.invalidate(&AuthError::TokenDecode("no readable exp claim".to_string())).await;
            return false;
        };

        if remaining <= 0 {
            info!(remaining, "access_token_expired");
            self.invalidate(&AuthError::TokenExpired).await;
            return false;
        }

        let window =
            i64::try_from(self.inner.config.timings.refresh_window_secs).unwrap_or(i64::MAX);
        if remaining < window {
            debug!(remaining, "token_near_expiry_refreshing");
            return self.refresh_access_token().await.is_ok();
        }

        self.inner.flags.set(TrustFlag::LastValidated);
        true
    }

    /// Tier 3: ask the authorization API whether this user may use the
    /// application.
    ///
    /// Results are cached per token fingerprint. A negative answer
    /// invalidates the session; transport errors are returned without
    /// touching it.
    pub async fn validate_with_team_api(&self) -> AuthResult<TeamValidation> {
        let validator = self.inner.validator.clone().ok_or_else(|| {
            AuthError::Config("no authorization validator configured".to_string())
        })?;
        let token = self.inner.tokens.read().ok_or(AuthError::NoToken)?;
        let print = fingerprint(&token);

        let trusted = self.trust_level().skips_validation();
        if let Some(cached) = self.cached_validation(&print, trusted) {
            debug!(trusted, "team_validation_cache_hit");
            return Ok(cached);
        }

        let acquired = self.inner.locks.acquire(LockName::TeamValidation);
        if !acquired {
            debug!("team_validation_in_progress_elsewhere");
        }
        let epoch = self.epoch();
        let result = validator.validate(&token).await;
        if acquired {
            self.inner.locks.release(LockName::TeamValidation);
        }
        if self.epoch() != epoch {
            return Err(AuthError::RemoteValidationFailed(
                "session ended during validation".to_string(),
            ));
        }

        let validation = result?;
        self.inner.flags.set_to(TrustFlag::IsAdminValidated, validation.is_admin);
        *self.inner.team_cache.lock() = Some(CachedValidation {
            fingerprint: print,
            checked_at_ms: self.inner.clock.millis_since_epoch(),
            result: validation,
        });

        if validation.valid {
            self.inner.flags.set(TrustFlag::Verified);
            self.inner.flags.set(TrustFlag::LastValidated);
        } else {
            warn!("team_validation_rejected_user");
            self.invalidate(&AuthError::RemoteValidationFailed(
                "user is not authorized for this application".to_string(),
            ))
            .await;
        }
        Ok(validation)
    }

    /// Verdict for this token newer than the cache window. Under skipping
    /// trust any verdict for the token counts.
    fn cached_validation(&self, print: &str, trusted: bool) -> Option<TeamValidation> {
        let ttl = u64::try_from(self.inner.config.timings.team_cache().as_millis()).ok()?;
        let now = self.inner.clock.millis_since_epoch();
        let cache = self.inner.team_cache.lock();
        cache
            .as_ref()
            .filter(|cached| cached.fingerprint == print)
            .filter(|cached| trusted || now.saturating_sub(cached.checked_at_ms) < ttl)
            .map(|cached| cached.result)
    }

    /// One background check. At most one runs per context at a time.
    pub async fn check_auth_status(&self) -> CheckOutcome {
        if self.inner.check_in_progress.swap(true, Ordering::SeqCst) {
            debug!("auth_check_already_running");
            return CheckOutcome::Skipped;
        }
        let _guard = CheckGuard(&self.inner.check_in_progress);

        let level = self.trust_level();
        if self.inner.tokens.read().is_none() {
            return CheckOutcome::NoSession;
        }
        let recently_validated = self
            .inner
            .flags
            .is_recent(TrustFlag::LastValidated, self.inner.config.timings.recent_validation());
        if level.skips_validation() || recently_validated {
            debug!(?level, recently_validated, "auth_check_skipped");
            return CheckOutcome::Skipped;
        }

        if self.is_token_valid_without_refresh() && self.is_fresh_enough() {
            self.inner.flags.set(TrustFlag::LastValidated);
            return CheckOutcome::Valid;
        }

        if self.inner.tokens.read_refresh().is_none() {
            self.invalidate(&AuthError::NoRefreshToken).await;
            return CheckOutcome::Failed;
        }
        match self.refresh_access_token().await {
            Ok(_) => CheckOutcome::Refreshed,
            Err(_) => CheckOutcome::Failed,
        }
    }

    fn is_fresh_enough(&self) -> bool {
        self.inner.tokens.read().is_some_and(|token| self.is_fresh(&token))
    }

    /// Run [`check_auth_status`](Self::check_auth_status) on the configured
    /// period, replacing any earlier schedule.
    pub fn start_periodic_check(&self) {
        let weak = Arc::downgrade(&self.inner);
        let handle = timer::recurring(self.inner.config.timings.periodic_check(), move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    let outcome = SessionManager { inner }.check_auth_status().await;
                    debug!(?outcome, "periodic_auth_check");
                }
            }
        });

        let previous = self.inner.periodic.lock().replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    pub fn stop_periodic_check(&self) {
        let periodic = self.inner.periodic.lock().take();
        if let Some(timer) = periodic {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for token fingerprints.

    use super::*;

    /// Validates `fingerprint` behavior for the long token scenario.
    ///
    /// Assertions:
    /// - Ensures only the leading and trailing ten characters are kept.
    #[test]
    fn test_fingerprint_keeps_edges() {
        let token = "abcdefghij0123456789ABCDEFGHIJ";
        assert_eq!(fingerprint(token), "abcdefghij:ABCDEFGHIJ");
    }

    /// Validates `fingerprint` behavior for the short token scenario.
    ///
    /// Assertions:
    /// - Ensures tokens up to twenty characters are returned unchanged.
    #[test]
    fn test_fingerprint_short_token_unchanged() {
        assert_eq!(fingerprint("short"), "short");
        assert_eq!(fingerprint("abcdefghij0123456789"), "abcdefghij0123456789");
    }

    /// Validates `fingerprint` behavior for the shared edge scenario.
    ///
    /// Assertions:
    /// - Ensures tokens differing only in the middle share a fingerprint.
    #[test]
    fn test_fingerprint_ignores_middle() {
        let a = "eyJhbGciOi.aaaaaaaaaa.signature1";
        let b = "eyJhbGciOi.bbbbbbbbbb.signature1";
        assert_eq!(fingerprint(a), "eyJhbGciOi:signature1");
        assert_eq!(fingerprint(a), fingerprint(b));
    }
}
