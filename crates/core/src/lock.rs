//! Cooperative locks over shared storage.
//!
//! Every context (tab) sharing the durable store sees the same lock entries.
//! A lock is two keys: a held marker and the acquisition time in epoch
//! milliseconds. There is no atomic compare-and-set, so two contexts can both
//! win a race; callers keep their critical sections idempotent instead.
//! A lock older than its timeout is stale and any caller may reclaim it, so
//! a crashed holder never blocks progress for long.

use std::sync::Arc;
use std::time::Duration;

use sessiongate_common::{Clock, KeyValueStore};
use tracing::{debug, warn};

use crate::config::LockTimeouts;

/// The locks used by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockName {
    Signin,
    Refresh,
    LocalValidation,
    UserInfoRefresh,
    TeamValidation,
}

impl LockName {
    pub const ALL: [Self; 5] = [
        Self::Signin,
        Self::Refresh,
        Self::LocalValidation,
        Self::UserInfoRefresh,
        Self::TeamValidation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signin => "signin",
            Self::Refresh => "refresh",
            Self::LocalValidation => "local_validation",
            Self::UserInfoRefresh => "user_info_refresh",
            Self::TeamValidation => "team_validation",
        }
    }

    /// Storage key of the held marker.
    pub fn key(self) -> &'static str {
        match self {
            Self::Signin => "auth_lock_signin",
            Self::Refresh => "auth_lock_refresh",
            Self::LocalValidation => "auth_lock_local_validation",
            Self::UserInfoRefresh => "auth_lock_user_info_refresh",
            Self::TeamValidation => "auth_lock_team_validation",
        }
    }

    /// Storage key of the acquisition timestamp.
    pub fn time_key(self) -> &'static str {
        match self {
            Self::Signin => "auth_lock_signin_time",
            Self::Refresh => "auth_lock_refresh_time",
            Self::LocalValidation => "auth_lock_local_validation_time",
            Self::UserInfoRefresh => "auth_lock_user_info_refresh_time",
            Self::TeamValidation => "auth_lock_team_validation_time",
        }
    }
}

/// Named locks backed by a [`KeyValueStore`].
#[derive(Clone)]
pub struct StorageLock {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    timeouts: LockTimeouts,
}

impl StorageLock {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, timeouts: LockTimeouts) -> Self {
        Self { store, clock, timeouts }
    }

    pub fn timeouts(&self) -> &LockTimeouts {
        &self.timeouts
    }

    /// Take the lock unless another holder's lock is still fresh.
    ///
    /// A storage failure purges every other lock and retries once. If that
    /// also fails the caller is told to proceed without exclusivity.
    pub fn acquire(&self, name: LockName) -> bool {
        if self.is_held(name) {
            debug!(lock = name.as_str(), "lock_busy");
            return false;
        }

        if let Err(err) = self.write(name) {
            warn!(lock = name.as_str(), error = %err, "lock_write_failed_purging_others");
            for other in LockName::ALL.into_iter().filter(|other| *other != name) {
                self.release(other);
            }
            if let Err(err) = self.write(name) {
                warn!(lock = name.as_str(), error = %err, "lock_unavailable_proceeding_unlocked");
            }
        }

        debug!(lock = name.as_str(), "lock_acquired");
        true
    }

    /// Clear the lock and its timestamp regardless of who holds it.
    pub fn release(&self, name: LockName) {
        for key in [name.key(), name.time_key()] {
            if let Err(err) = self.store.remove(key) {
                warn!(lock = name.as_str(), error = %err, "lock_release_failed");
            }
        }
    }

    pub fn release_all(&self) {
        for name in LockName::ALL {
            self.release(name);
        }
    }

    /// True iff the lock is present and younger than `max_age`.
    ///
    /// A held lock without a timestamp gets one written now and counts as
    /// active.
    pub fn is_active(&self, name: LockName, max_age: Duration) -> bool {
        if !self.is_marked(name) {
            return false;
        }

        match self.acquired_at(name) {
            Some(acquired_at) => {
                let age = self.clock.millis_since_epoch().saturating_sub(acquired_at);
                u128::from(age) < max_age.as_millis()
            }
            None => {
                debug!(lock = name.as_str(), "lock_missing_timestamp_healed");
                if let Err(err) =
                    self.store.set(name.time_key(), &self.clock.millis_since_epoch().to_string())
                {
                    warn!(lock = name.as_str(), error = %err, "lock_heal_failed");
                }
                true
            }
        }
    }

    /// [`Self::is_active`] with the configured timeout for `name`.
    pub fn is_held(&self, name: LockName) -> bool {
        self.is_active(name, self.timeouts.timeout(name))
    }

    /// Release every known lock older than its timeout. Returns how many were
    /// reclaimed.
    pub fn cleanup_stale(&self, timeouts: &LockTimeouts) -> usize {
        let mut reclaimed = 0;
        for name in LockName::ALL {
            if self.is_marked(name) && !self.is_active(name, timeouts.timeout(name)) {
                debug!(lock = name.as_str(), "stale_lock_reclaimed");
                self.release(name);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    fn is_marked(&self, name: LockName) -> bool {
        match self.store.get(name.key()) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                warn!(lock = name.as_str(), error = %err, "lock_read_failed");
                false
            }
        }
    }

    fn acquired_at(&self, name: LockName) -> Option<u64> {
        self.store.get(name.time_key()).ok().flatten().and_then(|raw| raw.parse().ok())
    }

    fn write(&self, name: LockName) -> sessiongate_common::StorageResult<()> {
        let now = self.clock.millis_since_epoch().to_string();
        self.store.set(name.time_key(), &now)?;
        self.store.set(name.key(), "true")
    }
}

impl std::fmt::Debug for StorageLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageLock").field("timeouts", &self.timeouts).finish()
    }
}
