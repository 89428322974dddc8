//! Session lifecycle: login, code exchange, refresh, logout and cross-context
//! synchronization.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use sessiongate_common::time::timer::{self, TimerHandle};
use sessiongate_common::error;
use sessiongate_common::{
    Clock, CookieJar, ErrorClassification, KeyValueStore, MemoryCookieJar, MemoryStore,
    StorageEvent, SystemClock,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{SessionEvent, SessionState};
use super::validation::CachedValidation;
use crate::codec::{self, Claims, DecodedToken};
use crate::config::SessionConfig;
use crate::error::{AuthError, AuthResult};
use crate::flags::{TrustFlag, TrustFlags};
use crate::lock::{LockName, StorageLock};
use crate::ports::{AuthorizationValidator, IdentityProvider, TokenResponse};
use crate::token_store::{TokenPair, TokenStore, ACCESS_TOKEN_KEY};

/// Ephemeral key holding the last authorization code handed to
/// [`SessionManager::signin_with_code`].
pub const PROCESSED_CODE_KEY: &str = "auth_processed_code";
/// Ephemeral key holding the path to return to after login.
pub const RETURN_PATH_KEY: &str = "auth_return_path";

const EVENT_CAPACITY: usize = 32;

type SharedRefresh = Shared<BoxFuture<'static, AuthResult<TokenPair>>>;

/// Handle to one context's session.
///
/// Cheap to clone; all clones share state. Must be used from within a tokio
/// runtime because refresh and periodic checks run on timers.
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) config: SessionConfig,
    pub(super) provider: Arc<dyn IdentityProvider>,
    pub(super) validator: Option<Arc<dyn AuthorizationValidator>>,
    pub(super) tokens: TokenStore,
    pub(super) locks: StorageLock,
    pub(super) flags: TrustFlags,
    pub(super) durable: Arc<dyn KeyValueStore>,
    pub(super) ephemeral: Arc<dyn KeyValueStore>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) team_cache: Mutex<Option<CachedValidation>>,
    pub(super) periodic: Mutex<Option<TimerHandle>>,
    pub(super) check_in_progress: AtomicBool,
    state: RwLock<SessionState>,
    /// Bumped by every logout; async work started under an older epoch
    /// must not write its result back.
    epoch: AtomicU64,
    inflight_refresh: Mutex<Option<SharedRefresh>>,
    refresh_timer: Mutex<Option<TimerHandle>>,
    next_refresh_at: Mutex<Option<i64>>,
    known_token: Mutex<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
}

/// Builder for [`SessionManager`].
///
/// Only the identity provider is mandatory. Storage defaults to in-memory
/// backends and time to the system clock.
pub struct SessionManagerBuilder {
    config: SessionConfig,
    provider: Option<Arc<dyn IdentityProvider>>,
    validator: Option<Arc<dyn AuthorizationValidator>>,
    durable: Option<Arc<dyn KeyValueStore>>,
    ephemeral: Option<Arc<dyn KeyValueStore>>,
    cookies: Option<Arc<dyn CookieJar>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SessionManagerBuilder {
    fn new(config: SessionConfig) -> Self {
        Self {
            config,
            provider: None,
            validator: None,
            durable: None,
            ephemeral: None,
            cookies: None,
            clock: None,
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Enables [`SessionManager::validate_with_team_api`].
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn AuthorizationValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Store shared by every context of the application.
    #[must_use]
    pub fn durable(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Store private to this context (PKCE state, processed codes, return
    /// path).
    #[must_use]
    pub fn ephemeral(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.ephemeral = Some(store);
        self
    }

    #[must_use]
    pub fn cookies(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> AuthResult<SessionManager> {
        self.config.validate()?;
        let provider = self
            .provider
            .ok_or_else(|| AuthError::Config("an identity provider is required".to_string()))?;

        let durable = self
            .durable
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let ephemeral = self
            .ephemeral
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let cookies =
            self.cookies.unwrap_or_else(|| Arc::new(MemoryCookieJar::new()) as Arc<dyn CookieJar>);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let tokens = TokenStore::new(durable.clone(), cookies, self.config.cookies.clone());
        let locks = StorageLock::new(durable.clone(), clock.clone(), self.config.locks);
        let flags =
            TrustFlags::new(durable.clone(), clock.clone(), self.config.timings.callback_trust());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(SessionManager {
            inner: Arc::new(Inner {
                config: self.config,
                provider,
                validator: self.validator,
                tokens,
                locks,
                flags,
                durable,
                ephemeral,
                clock,
                team_cache: Mutex::new(None),
                periodic: Mutex::new(None),
                check_in_progress: AtomicBool::new(false),
                state: RwLock::new(SessionState::Anonymous),
                epoch: AtomicU64::new(0),
                inflight_refresh: Mutex::new(None),
                refresh_timer: Mutex::new(None),
                next_refresh_at: Mutex::new(None),
                known_token: Mutex::new(None),
                events,
            }),
        })
    }
}

impl SessionManager {
    pub fn builder(config: SessionConfig) -> SessionManagerBuilder {
        SessionManagerBuilder::new(config)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.tokens.read()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn locks(&self) -> &StorageLock {
        &self.inner.locks
    }

    pub fn flags(&self) -> &TrustFlags {
        &self.inner.flags
    }

    pub fn durable_store(&self) -> Arc<dyn KeyValueStore> {
        self.inner.durable.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    /// Decode a token, letting the provider's own parser win when it has
    /// one.
    pub fn decode(&self, token: &str) -> Option<DecodedToken> {
        codec::decode_with(self.inner.provider.as_ref(), token)
    }

    /// Claims of the current access token.
    pub fn claims(&self) -> Option<Claims> {
        self.access_token().and_then(|token| self.decode(&token)).map(|decoded| decoded.claims())
    }

    /// Admin status from the last team validation, or from token claims.
    pub fn is_admin(&self) -> bool {
        self.inner.flags.has(TrustFlag::IsAdminValidated)
            || self.claims().is_some_and(|claims| claims.is_admin())
    }

    /// Unix seconds at which the next proactive refresh fires.
    pub fn scheduled_refresh_at(&self) -> Option<i64> {
        *self.inner.next_refresh_at.lock()
    }

    pub fn has_pending_timers(&self) -> bool {
        self.inner.refresh_timer.lock().is_some() || self.inner.periodic.lock().is_some()
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    /// Restore whatever session the stores hold.
    ///
    /// A token that is still valid is adopted with absolute trust; an
    /// expired one is refreshed when possible and otherwise discarded.
    pub async fn initialize(&self) -> SessionState {
        if self.inner.tokens.restore_backup() {
            debug!("token_backup_restored");
        }
        let reclaimed = self.inner.locks.cleanup_stale(&self.inner.config.locks);
        if reclaimed > 0 {
            debug!(reclaimed, "stale_locks_reclaimed_at_startup");
        }

        match self.inner.tokens.read() {
            Some(token) if self.is_unexpired(&token) => {
                self.inner.flags.set(TrustFlag::AbsoluteTrust);
                self.adopt_token(&token);
                info!("session_restored");
            }
            Some(_) if self.inner.tokens.read_refresh().is_some() => {
                info!("stored_token_expired_refreshing");
                if let Err(err) = self.refresh_access_token().await {
                    debug!(error = %err, "startup_refresh_failed");
                }
            }
            Some(_) => {
                info!("stored_token_expired_without_refresh_token");
                self.logout().await;
            }
            None => {
                // Flags without a token are leftovers of an interrupted logout
                self.inner.flags.clear_all();
                self.set_state(SessionState::Anonymous);
            }
        }
        self.state()
    }

    // ------------------------------------------------------------------
    // Login
    // ------------------------------------------------------------------

    /// Build the authorization URL the user should be sent to.
    ///
    /// `broker` selects an upstream identity broker at the provider.
    pub fn start_login(&self, broker: Option<&str>) -> AuthResult<String> {
        self.inner.provider.clear_pkce_state();
        let url = self.inner.provider.authorization_url(broker)?;
        self.set_state(SessionState::Authenticating);
        info!(broker = broker.unwrap_or("default"), "login_started");
        Ok(url)
    }

    /// Like [`start_login`](Self::start_login), remembering where to send the
    /// user once the callback completes.
    pub fn start_login_with_return(
        &self,
        return_to: &str,
        broker: Option<&str>,
    ) -> AuthResult<String> {
        if let Err(err) = self.inner.ephemeral.set(RETURN_PATH_KEY, return_to) {
            warn!(error = %err, "return_path_not_saved");
        }
        self.start_login(broker)
    }

    /// Path saved by [`start_login_with_return`](Self::start_login_with_return),
    /// removed on read.
    pub fn take_return_path(&self) -> Option<String> {
        let path = self.inner.ephemeral.get(RETURN_PATH_KEY).ok().flatten()?;
        if let Err(err) = self.inner.ephemeral.remove(RETURN_PATH_KEY) {
            warn!(error = %err, "return_path_not_cleared");
        }
        Some(path)
    }

    /// Complete the callback by exchanging `code` for tokens.
    ///
    /// Idempotent: repeating a processed code, or arriving while another
    /// context already holds a valid token, returns `Ok(true)` without a
    /// second exchange.
    pub async fn signin_with_code(&self, code: &str, state: &str) -> AuthResult<bool> {
        let processed = self.inner.ephemeral.get(PROCESSED_CODE_KEY).ok().flatten();
        if processed.as_deref() == Some(code) && self.inner.tokens.read().is_some() {
            debug!("signin_code_already_processed");
            return Ok(true);
        }

        if let Some(token) = self.inner.tokens.read() {
            if self.is_unexpired(&token) {
                debug!("signin_skipped_existing_token");
                self.remember_code(code);
                self.adopt_token(&token);
                return Ok(true);
            }
        }

        if self.inner.locks.is_held(LockName::Signin) {
            debug!("signin_in_progress_elsewhere");
            if let Some(pair) = self.wait_for_token(|token| self.is_unexpired(token)).await {
                self.remember_code(code);
                self.adopt_token(&pair.access_token);
                return Ok(true);
            }
            warn!("signin_lock_forced");
            self.inner.locks.release(LockName::Signin);
        }

        if !self.inner.locks.acquire(LockName::Signin) {
            return Err(AuthError::AuthConflict(
                "another context kept the signin lock".to_string(),
            ));
        }

        let epoch = self.epoch();
        self.set_state(SessionState::Authenticating);
        let result = self.exchange(code, state, epoch).await;
        if self.epoch() == epoch {
            self.inner.locks.release(LockName::Signin);
        }

        match result {
            Ok(()) => Ok(true),
            Err(err) => {
                error::report("signin_failed", &err);
                if self.epoch() == epoch {
                    self.set_state(SessionState::Anonymous);
                }
                Err(err)
            }
        }
    }

    async fn exchange(&self, code: &str, state: &str, epoch: u64) -> AuthResult<()> {
        let response =
            self.inner.provider.exchange_code(code, state).await.map_err(|err| match err {
                AuthError::StateMismatch { .. } | AuthError::ExchangeFailed(_) => err,
                other => AuthError::ExchangeFailed(other.to_string()),
            })?;

        if self.epoch() != epoch {
            return Err(AuthError::ExchangeFailed("session was reset during the exchange".into()));
        }

        let pair = into_pair(response, AuthError::ExchangeFailed)?;
        self.inner.tokens.save(&pair)?;
        self.remember_code(code);

        for flag in [
            TrustFlag::AbsoluteTrust,
            TrustFlag::Trusted,
            TrustFlag::Verified,
            TrustFlag::AuthCallbackTime,
        ] {
            self.inner.flags.set(flag);
        }
        self.adopt_token(&pair.access_token);
        info!(expires_in = ?pair.expires_in, "signin_completed");
        Ok(())
    }

    fn remember_code(&self, code: &str) {
        if let Err(err) = self.inner.ephemeral.set(PROCESSED_CODE_KEY, code) {
            warn!(error = %err, "processed_code_not_saved");
        }
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Trade the refresh token for a new pair.
    ///
    /// Concurrent callers in this context share one request. A failure
    /// invalidates the session.
    pub async fn refresh_access_token(&self) -> AuthResult<TokenPair> {
        let shared = {
            let mut slot = self.inner.inflight_refresh.lock();
            match slot.as_ref() {
                Some(inflight) => {
                    debug!("refresh_joined_inflight");
                    inflight.clone()
                }
                None => {
                    let this = self.clone();
                    let refresh = async move {
                        let result = this.run_refresh().await;
                        this.inner.inflight_refresh.lock().take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };
        shared.await
    }

    async fn run_refresh(&self) -> AuthResult<TokenPair> {
        let epoch = self.epoch();
        self.set_state(SessionState::Refreshing);

        let result = self.refresh_unless_busy(epoch).await;
        if let Err(err) = &result {
            if self.epoch() == epoch {
                error::report("token_refresh_failed", err);
                self.invalidate(err).await;
            } else {
                debug!("refresh_result_discarded_after_logout");
            }
        }
        result
    }

    async fn refresh_unless_busy(&self, epoch: u64) -> AuthResult<TokenPair> {
        if self.inner.tokens.read_refresh().is_none() {
            return Err(AuthError::NoRefreshToken);
        }

        if self.inner.locks.is_held(LockName::Refresh) {
            debug!("refresh_in_progress_elsewhere");
            if let Some(pair) = self.wait_for_token(|token| self.is_fresh(token)).await {
                self.adopt_token(&pair.access_token);
                return Ok(pair);
            }
            warn!("refresh_lock_forced");
            self.inner.locks.release(LockName::Refresh);
        }

        let acquired = self.inner.locks.acquire(LockName::Refresh);
        let result = self.refresh_locked(epoch).await;
        if acquired && self.epoch() == epoch {
            self.inner.locks.release(LockName::Refresh);
        }
        result
    }

    async fn refresh_locked(&self, epoch: u64) -> AuthResult<TokenPair> {
        if let Some(pair) = self.inner.tokens.read_pair() {
            if self.is_fresh(&pair.access_token) {
                debug!("refresh_skipped_token_already_fresh");
                self.adopt_token(&pair.access_token);
                return Ok(pair);
            }
        }

        let refresh_token = self.inner.tokens.read_refresh().ok_or(AuthError::NoRefreshToken)?;
        let response = self.request_refresh(&refresh_token).await?;
        if self.epoch() != epoch {
            return Err(AuthError::RefreshFailed("session ended during the refresh".into()));
        }

        let mut pair = into_pair(response, AuthError::RefreshFailed)?;
        if pair.refresh_token.is_none() {
            pair.refresh_token = Some(refresh_token);
        }
        self.inner.tokens.save(&pair)?;
        self.inner.flags.set(TrustFlag::LastRefresh);
        self.adopt_token(&pair.access_token);
        info!(expires_in = ?pair.expires_in, "token_refreshed");
        Ok(pair)
    }

    async fn request_refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        let timings = &self.inner.config.timings;
        let attempts = timings.refresh_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.provider.refresh_access_token(refresh_token).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(attempt, error = %err, "token_refresh_retrying");
                    tokio::time::sleep(timings.poll_interval() * attempt).await;
                    attempt += 1;
                }
                Err(AuthError::RefreshFailed(message)) => {
                    return Err(AuthError::RefreshFailed(message))
                }
                Err(other) => return Err(AuthError::RefreshFailed(other.to_string())),
            }
        }
    }

    /// Poll the shared store for a token another context is producing.
    async fn wait_for_token(&self, accept: impl Fn(&str) -> bool) -> Option<TokenPair> {
        let timings = &self.inner.config.timings;
        for attempt in 1..=timings.poll_attempts {
            tokio::time::sleep(timings.poll_interval()).await;
            if let Some(pair) = self.inner.tokens.read_pair() {
                if accept(&pair.access_token) {
                    debug!(attempt, "token_appeared_while_waiting");
                    return Some(pair);
                }
            }
        }
        None
    }

    fn schedule_refresh(&self, token: &str) {
        let Some(exp) = self.decode(token).and_then(|decoded| decoded.claims().exp) else {
            debug!("refresh_not_scheduled_without_exp");
            return;
        };

        let lead = i64::try_from(self.inner.config.timings.refresh_lead_secs).unwrap_or(i64::MAX);
        let fire_at = exp.saturating_sub(lead);
        let wait = fire_at.saturating_sub(self.inner.clock.seconds_since_epoch());
        let delay = Duration::from_secs(u64::try_from(wait).unwrap_or(0));

        let weak = Arc::downgrade(&self.inner);
        let handle = timer::after(delay, move || async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(err) = (SessionManager { inner }).refresh_access_token().await {
                warn!(error = %err, "scheduled_refresh_failed");
            }
        });

        *self.inner.next_refresh_at.lock() = Some(fire_at);
        let previous = self.inner.refresh_timer.lock().replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
        }
        debug!(fire_at, delay_secs = delay.as_secs(), "refresh_scheduled");
    }

    fn cancel_timers(&self) {
        let refresh = self.inner.refresh_timer.lock().take();
        if let Some(timer) = refresh {
            timer.cancel();
        }
        self.inner.next_refresh_at.lock().take();

        let periodic = self.inner.periodic.lock().take();
        if let Some(timer) = periodic {
            timer.cancel();
        }
    }

    // ------------------------------------------------------------------
    // Logout
    // ------------------------------------------------------------------

    /// End the session everywhere this context can reach.
    ///
    /// The server-side call is best effort; local state is always cleared.
    pub async fn logout(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_timers();

        if let Some(token) = self.inner.tokens.read() {
            if let Err(err) = self.inner.provider.revoke(&token).await {
                warn!(error = %err, "server_logout_failed");
            }
        }

        self.clear_local_session();
        info!("logout_completed");
    }

    fn clear_local_session(&self) {
        self.inner.tokens.clear();
        self.inner.flags.clear_all();
        self.inner.flags.clear_timestamps();
        self.inner.locks.release_all();
        self.inner.provider.clear_pkce_state();
        if let Err(err) = self.inner.ephemeral.clear() {
            warn!(error = %err, "ephemeral_store_clear_failed");
        }
        self.inner.team_cache.lock().take();
        self.inner.inflight_refresh.lock().take();
        self.inner.known_token.lock().take();

        self.set_state(SessionState::Anonymous);
        self.emit(SessionEvent::LoggedOut);
    }

    /// Mark the session unusable, tell listeners, then log out.
    pub async fn invalidate(&self, reason: &AuthError) {
        warn!(reason = %reason, "session_invalidated");
        self.set_state(SessionState::Invalid);
        self.emit(SessionEvent::InvalidAuth { reason: reason.to_string() });
        self.logout().await;
    }

    // ------------------------------------------------------------------
    // Cross-context synchronization
    // ------------------------------------------------------------------

    /// React to a change another context made to the shared store.
    ///
    /// Only the access token key matters: a new value is adopted, a removal
    /// logs this context out locally.
    pub fn handle_storage_event(&self, event: &StorageEvent) {
        if event.key.is_some() && event.key.as_deref() != Some(ACCESS_TOKEN_KEY) {
            return;
        }

        match self.inner.tokens.read() {
            Some(token) => {
                let known = self.inner.known_token.lock().clone();
                if known.as_deref() != Some(token.as_str()) {
                    debug!("token_changed_in_other_context");
                    self.adopt_token(&token);
                }
            }
            None => {
                let had_session = self.inner.known_token.lock().is_some();
                if had_session {
                    info!("logged_out_in_other_context");
                    self.inner.epoch.fetch_add(1, Ordering::SeqCst);
                    self.cancel_timers();
                    self.clear_local_session();
                }
            }
        }
    }

    /// Forward storage notifications to [`handle_storage_event`](Self::handle_storage_event)
    /// until the channel closes or the manager is dropped.
    pub fn spawn_storage_listener(
        &self,
        mut events: broadcast::Receiver<StorageEvent>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        SessionManager { inner }.handle_storage_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "storage_events_lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Internals shared with validation
    // ------------------------------------------------------------------

    pub(super) fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    pub(super) fn set_state(&self, next: SessionState) {
        let mut state = self.inner.state.write();
        if *state != next {
            debug!(from = ?*state, to = ?next, "session_state_changed");
            *state = next;
        }
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    /// Make `token` the session's current token, rescheduling the refresh
    /// when it changed.
    pub(super) fn adopt_token(&self, token: &str) {
        let changed = {
            let mut known = self.inner.known_token.lock();
            let changed = known.as_deref() != Some(token);
            if changed {
                *known = Some(token.to_string());
            }
            changed
        };
        self.set_state(SessionState::Authenticated);

        let unscheduled = self.inner.refresh_timer.lock().is_none();
        if changed || unscheduled {
            self.schedule_refresh(token);
        }
        if changed {
            self.emit(SessionEvent::TokenChanged);
        }
    }

    pub(super) fn seconds_remaining(&self, token: &str) -> Option<i64> {
        let claims = self.decode(token)?.claims();
        claims.seconds_remaining(self.inner.clock.seconds_since_epoch())
    }

    /// More than the expiry skew left.
    pub(super) fn is_unexpired(&self, token: &str) -> bool {
        let skew = i64::try_from(self.inner.config.timings.expiry_skew_secs).unwrap_or(i64::MAX);
        self.seconds_remaining(token).is_some_and(|remaining| remaining > skew)
    }

    /// Far enough from expiry that refreshing would be wasted.
    pub(super) fn is_fresh(&self, token: &str) -> bool {
        let window =
            i64::try_from(self.inner.config.timings.refresh_window_secs).unwrap_or(i64::MAX);
        self.seconds_remaining(token).is_some_and(|remaining| remaining > window)
    }
}

fn into_pair(response: TokenResponse, fail: fn(String) -> AuthError) -> AuthResult<TokenPair> {
    let message = response.error_message();
    response
        .into_pair()
        .ok_or_else(|| fail(message.unwrap_or_else(|| "response contained no access_token".into())))
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("epoch", &self.epoch())
            .field("next_refresh_at", &self.scheduled_refresh_at())
            .finish_non_exhaustive()
    }
}
