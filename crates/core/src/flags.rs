//! Trust flags and the validation-skip policy.
//!
//! Flags are persisted markers shared by every context. Boolean markers
//! record trust decisions; timestamp markers record when something last
//! happened. [`TrustFlags::trust_level`] is the one place that turns the raw
//! markers into a [`TrustLevel`], and [`TrustLevel::skips_validation`] is
//! what every validation path consults.

use std::sync::Arc;
use std::time::Duration;

use sessiongate_common::{Clock, KeyValueStore};
use tracing::{debug, warn};

/// A persisted marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustFlag {
    AbsoluteTrust,
    Trusted,
    Verified,
    SkipAllValidation,
    IsAdminValidated,
    /// When the last auth callback completed
    AuthCallbackTime,
    /// When validation last succeeded
    LastValidated,
    /// When the token was last refreshed
    LastRefresh,
}

impl TrustFlag {
    pub const ALL: [Self; 8] = [
        Self::AbsoluteTrust,
        Self::Trusted,
        Self::Verified,
        Self::SkipAllValidation,
        Self::IsAdminValidated,
        Self::AuthCallbackTime,
        Self::LastValidated,
        Self::LastRefresh,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::AbsoluteTrust => "auth_absolute_trust",
            Self::Trusted => "auth_trusted",
            Self::Verified => "auth_verified",
            Self::SkipAllValidation => "auth_skip_all_validation",
            Self::IsAdminValidated => "auth_is_admin_validated",
            Self::AuthCallbackTime => "auth_callback_time",
            Self::LastValidated => "auth_last_validated",
            Self::LastRefresh => "auth_last_refresh",
        }
    }

    /// Timestamp markers store epoch milliseconds instead of `"true"`.
    pub fn is_timestamp(self) -> bool {
        matches!(self, Self::AuthCallbackTime | Self::LastValidated | Self::LastRefresh)
    }
}

/// How much the current session may be trusted without checking.
///
/// Ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustLevel {
    None,
    /// An auth callback completed moments ago
    Recent,
    /// Verified by the identity provider or authorization API earlier
    Verified,
    /// Explicitly trusted until logout
    Absolute,
}

impl TrustLevel {
    /// Whether token validation may be skipped entirely.
    pub fn skips_validation(self) -> bool {
        matches!(self, Self::Absolute | Self::Recent)
    }
}

/// Reads and writes [`TrustFlag`]s.
#[derive(Clone)]
pub struct TrustFlags {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    callback_window: Duration,
}

impl TrustFlags {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, callback_window: Duration) -> Self {
        Self { store, clock, callback_window }
    }

    pub fn has(&self, flag: TrustFlag) -> bool {
        let value = self.read(flag);
        if flag.is_timestamp() {
            value.and_then(|raw| raw.parse::<u64>().ok()).is_some()
        } else {
            value.as_deref() == Some("true")
        }
    }

    /// Set a boolean marker, or stamp a timestamp marker with now.
    pub fn set(&self, flag: TrustFlag) {
        let value = if flag.is_timestamp() {
            self.clock.millis_since_epoch().to_string()
        } else {
            "true".to_string()
        };
        if let Err(err) = self.store.set(flag.key(), &value) {
            warn!(flag = flag.key(), error = %err, "trust_flag_write_failed");
        }
    }

    /// Set or clear a marker.
    pub fn set_to(&self, flag: TrustFlag, value: bool) {
        if value {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    pub fn clear(&self, flag: TrustFlag) {
        if let Err(err) = self.store.remove(flag.key()) {
            warn!(flag = flag.key(), error = %err, "trust_flag_clear_failed");
        }
    }

    /// Clear every boolean marker. Timestamps survive.
    pub fn clear_all(&self) {
        for flag in TrustFlag::ALL.into_iter().filter(|flag| !flag.is_timestamp()) {
            self.clear(flag);
        }
    }

    pub fn clear_timestamps(&self) {
        for flag in TrustFlag::ALL.into_iter().filter(|flag| flag.is_timestamp()) {
            self.clear(flag);
        }
    }

    /// Epoch milliseconds stored under a timestamp marker.
    pub fn timestamp(&self, flag: TrustFlag) -> Option<u64> {
        self.read(flag).and_then(|raw| raw.parse().ok())
    }

    /// True if the timestamp marker is younger than `window`.
    pub fn is_recent(&self, flag: TrustFlag, window: Duration) -> bool {
        self.timestamp(flag).is_some_and(|at| {
            let age = self.clock.millis_since_epoch().saturating_sub(at);
            u128::from(age) < window.as_millis()
        })
    }

    /// Collapse the markers into a single trust level.
    ///
    /// Absolute trust and skip-all win, then a recent callback, then a
    /// verified or trusted marker.
    pub fn trust_level(&self) -> TrustLevel {
        if self.has(TrustFlag::AbsoluteTrust) || self.has(TrustFlag::SkipAllValidation) {
            TrustLevel::Absolute
        } else if self.is_recent(TrustFlag::AuthCallbackTime, self.callback_window) {
            TrustLevel::Recent
        } else if self.has(TrustFlag::Verified) || self.has(TrustFlag::Trusted) {
            TrustLevel::Verified
        } else {
            TrustLevel::None
        }
    }

    pub fn should_skip_validation(&self) -> bool {
        let level = self.trust_level();
        if level.skips_validation() {
            debug!(?level, "validation_skipped_by_trust");
        }
        level.skips_validation()
    }

    fn read(&self, flag: TrustFlag) -> Option<String> {
        match self.store.get(flag.key()) {
            Ok(value) => value,
            Err(err) => {
                warn!(flag = flag.key(), error = %err, "trust_flag_read_failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for TrustFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustFlags").field("callback_window", &self.callback_window).finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for flags.
    use sessiongate_common::{MemoryStore, MockClock};

    use super::*;

    fn flags() -> (TrustFlags, MemoryStore, MockClock) {
        let store = MemoryStore::new();
        let clock = MockClock::new();
        let flags = TrustFlags::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            Duration::from_secs(600),
        );
        (flags, store, clock)
    }

    /// Validates `TrustFlags::should_skip_validation` for the auth callback
    /// window scenario.
    ///
    /// Assertions:
    /// - Ensures validation is skipped within 10 minutes of the callback.
    /// - Ensures it is no longer skipped once the window elapses.
    #[test]
    fn test_callback_window_skips_validation() {
        let (flags, _, clock) = flags();
        flags.set(TrustFlag::AuthCallbackTime);

        clock.advance(Duration::from_secs(9 * 60));
        assert_eq!(flags.trust_level(), TrustLevel::Recent);
        assert!(flags.should_skip_validation());

        clock.advance(Duration::from_secs(60));
        assert_eq!(flags.trust_level(), TrustLevel::None);
        assert!(!flags.should_skip_validation());
    }

    /// Validates `TrustFlags::trust_level` precedence.
    ///
    /// Assertions:
    /// - Confirms verified alone does not skip validation.
    /// - Confirms skip-all maps to absolute trust.
    #[test]
    fn test_trust_level_precedence() {
        let (flags, _, _) = flags();
        assert_eq!(flags.trust_level(), TrustLevel::None);

        flags.set(TrustFlag::Verified);
        assert_eq!(flags.trust_level(), TrustLevel::Verified);
        assert!(!flags.should_skip_validation());

        flags.set(TrustFlag::SkipAllValidation);
        assert_eq!(flags.trust_level(), TrustLevel::Absolute);
        assert!(flags.should_skip_validation());
    }

    /// Validates `TrustFlags::clear_all` preserves timestamps.
    ///
    /// Assertions:
    /// - Ensures boolean markers are removed.
    /// - Ensures timestamp markers remain until `clear_timestamps`.
    #[test]
    fn test_clear_all_preserves_timestamps() {
        let (flags, _, _) = flags();
        flags.set(TrustFlag::AbsoluteTrust);
        flags.set(TrustFlag::IsAdminValidated);
        flags.set(TrustFlag::LastRefresh);

        flags.clear_all();
        assert!(!flags.has(TrustFlag::AbsoluteTrust));
        assert!(!flags.has(TrustFlag::IsAdminValidated));
        assert!(flags.has(TrustFlag::LastRefresh));

        flags.clear_timestamps();
        assert!(!flags.has(TrustFlag::LastRefresh));
    }

    /// Validates `TrustFlags::set_to` and `is_recent`.
    #[test]
    fn test_set_to_and_is_recent() {
        let (flags, store, clock) = flags();
        flags.set_to(TrustFlag::Trusted, true);
        assert_eq!(store.get("auth_trusted").unwrap().as_deref(), Some("true"));
        flags.set_to(TrustFlag::Trusted, false);
        assert!(!flags.has(TrustFlag::Trusted));

        flags.set(TrustFlag::LastValidated);
        clock.advance(Duration::from_secs(299));
        assert!(flags.is_recent(TrustFlag::LastValidated, Duration::from_secs(300)));
        clock.advance(Duration::from_secs(1));
        assert!(!flags.is_recent(TrustFlag::LastValidated, Duration::from_secs(300)));
    }
}
