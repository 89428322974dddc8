//! Test doubles for the port traits and a ready-made session harness.
//!
//! Used by this crate's own tests and by adapters that want to exercise the
//! session layer without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sessiongate_common::{Clock, MemoryCookieJar, MemoryStore, MockClock};

use crate::codec::{encode_unsigned, Claims};
use crate::config::SessionConfig;
use crate::error::{AuthError, AuthResult};
use crate::ports::{
    AuthorizationValidator, FetchedImage, IdentityProvider, ImageFetcher, ProfileEndpoint,
    ProfileSource, TeamValidation, TokenResponse,
};
use crate::session::SessionManager;
use crate::token_store::TokenPair;
use crate::user_info::ProfileEnvelope;

/// Unsigned JWT carrying `payload`.
pub fn fake_jwt(payload: &Value) -> String {
    encode_unsigned(&json!({ "alg": "none", "typ": "JWT" }), payload)
}

/// Unsigned JWT for `subject` whose `exp` is `secs` from `clock`'s now.
pub fn token_expiring_in(clock: &dyn Clock, secs: i64, subject: &str) -> String {
    let now = clock.seconds_since_epoch();
    fake_jwt(&json!({
        "sub": subject,
        "name": subject,
        "preferred_username": subject,
        "iat": now,
        "exp": now + secs,
    }))
}

pub fn test_config() -> SessionConfig {
    SessionConfig::new("https://id.example.test", "test-client", "https://app.example.test")
}

// ============================================================================
// Identity provider
// ============================================================================

/// Identity provider that mints tokens against a shared clock.
pub struct MockIdentityProvider {
    clock: Arc<dyn Clock>,
    lifetime_secs: AtomicI64,
    rotate_refresh: AtomicBool,
    delay: Mutex<Duration>,
    exchange_error: Mutex<Option<AuthError>>,
    refresh_errors: Mutex<Vec<AuthError>>,
    issued: AtomicUsize,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    pkce_clears: AtomicUsize,
}

impl MockIdentityProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            lifetime_secs: AtomicI64::new(3600),
            rotate_refresh: AtomicBool::new(true),
            delay: Mutex::new(Duration::ZERO),
            exchange_error: Mutex::new(None),
            refresh_errors: Mutex::new(Vec::new()),
            issued: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            pkce_clears: AtomicUsize::new(0),
        }
    }

    /// Latency applied to every network call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_token_lifetime(&self, secs: i64) {
        self.lifetime_secs.store(secs, Ordering::SeqCst);
    }

    /// Whether refresh responses carry a new refresh token.
    pub fn rotate_refresh_tokens(&self, rotate: bool) {
        self.rotate_refresh.store(rotate, Ordering::SeqCst);
    }

    pub fn fail_exchange_with(&self, error: Option<AuthError>) {
        *self.exchange_error.lock() = error;
    }

    /// Queue errors returned by the next refresh calls, in order.
    pub fn fail_refresh_with(&self, errors: Vec<AuthError>) {
        *self.refresh_errors.lock() = errors;
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn pkce_clears(&self) -> usize {
        self.pkce_clears.load(Ordering::SeqCst)
    }

    fn mint(&self) -> TokenResponse {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let lifetime = self.lifetime_secs.load(Ordering::SeqCst);
        let now = self.clock.seconds_since_epoch();
        let access = fake_jwt(&json!({
            "sub": "user-1",
            "name": "jdoe",
            "preferred_username": "jdoe",
            "given_name": "John",
            "family_name": "Doe",
            "owner": "acme",
            "iat": now,
            "exp": now + lifetime,
            "jti": serial,
        }));
        TokenResponse {
            access_token: Some(access),
            refresh_token: Some(format!("refresh-{serial}")),
            expires_in: Some(lifetime),
            token_type: Some("Bearer".to_string()),
            ..TokenResponse::default()
        }
    }

    async fn latency(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorization_url(&self, broker: Option<&str>) -> AuthResult<String> {
        let mut url = "https://id.example.test/login/oauth/authorize?client_id=test-client&state=mock-state".to_string();
        if let Some(broker) = broker {
            url.push_str("&provider=");
            url.push_str(broker);
        }
        Ok(url)
    }

    fn clear_pkce_state(&self) {
        self.pkce_clears.fetch_add(1, Ordering::SeqCst);
    }

    async fn exchange_code(&self, _code: &str, state: &str) -> AuthResult<TokenResponse> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.latency().await;
        if state != "mock-state" {
            return Err(AuthError::StateMismatch {
                expected: "mock-state".to_string(),
                received: state.to_string(),
            });
        }
        if let Some(error) = self.exchange_error.lock().clone() {
            return Err(error);
        }
        Ok(self.mint())
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> AuthResult<TokenResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.latency().await;
        let queued = {
            let mut errors = self.refresh_errors.lock();
            (!errors.is_empty()).then(|| errors.remove(0))
        };
        match queued {
            Some(error) => Err(error),
            None => {
                let mut response = self.mint();
                if !self.rotate_refresh.load(Ordering::SeqCst) {
                    response.refresh_token = None;
                }
                Ok(response)
            }
        }
    }

    async fn revoke(&self, _access_token: &str) -> AuthResult<()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Authorization validator
// ============================================================================

pub struct MockAuthorizationValidator {
    answer: Mutex<AuthResult<TeamValidation>>,
    calls: AtomicUsize,
}

impl MockAuthorizationValidator {
    pub fn new() -> Self {
        Self {
            answer: Mutex::new(Ok(TeamValidation { valid: true, is_admin: false })),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answer(&self, answer: AuthResult<TeamValidation>) {
        *self.answer.lock() = answer;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAuthorizationValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationValidator for MockAuthorizationValidator {
    async fn validate(&self, _access_token: &str) -> AuthResult<TeamValidation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.lock().clone()
    }
}

// ============================================================================
// Profile source
// ============================================================================

/// Profile source answering from a per-endpoint table; unknown endpoints
/// fail with an HTTP error.
#[derive(Default)]
pub struct MockProfileSource {
    responses: Mutex<HashMap<ProfileEndpoint, AuthResult<ProfileEnvelope>>>,
    calls: Mutex<Vec<ProfileEndpoint>>,
}

impl MockProfileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, endpoint: ProfileEndpoint, response: AuthResult<ProfileEnvelope>) {
        self.responses.lock().insert(endpoint, response);
    }

    pub fn calls(&self) -> Vec<ProfileEndpoint> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProfileSource for MockProfileSource {
    async fn fetch(
        &self,
        endpoint: ProfileEndpoint,
        _access_token: &str,
        _claims: &Claims,
    ) -> AuthResult<ProfileEnvelope> {
        self.calls.lock().push(endpoint);
        self.responses
            .lock()
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(|| Err(AuthError::Http(format!("{} returned 404", endpoint.as_str()))))
    }
}

// ============================================================================
// Image fetcher
// ============================================================================

#[derive(Default)]
pub struct MockImageFetcher {
    images: Mutex<HashMap<String, FetchedImage>>,
    calls: AtomicUsize,
}

impl MockImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, bytes: &[u8], content_type: &str) {
        self.images.lock().insert(
            url.to_string(),
            FetchedImage { bytes: bytes.to_vec(), content_type: content_type.to_string() },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for MockImageFetcher {
    async fn fetch(&self, url: &str) -> AuthResult<FetchedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| AuthError::Http(format!("{url} returned 404")))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One context's session wired to in-memory stores and mocks.
pub struct SessionFixture {
    pub clock: MockClock,
    pub durable: MemoryStore,
    pub ephemeral: MemoryStore,
    pub cookies: Arc<MemoryCookieJar>,
    pub provider: Arc<MockIdentityProvider>,
    pub validator: Arc<MockAuthorizationValidator>,
    pub session: SessionManager,
}

impl SessionFixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let clock = MockClock::new();
        let provider = Arc::new(MockIdentityProvider::new(Arc::new(clock.clone())));
        Self::assemble(config, clock, MemoryStore::new(), provider)
    }

    /// A second context sharing this one's durable store, clock and
    /// provider, with its own ephemeral store and cookies.
    pub fn sibling(&self) -> Self {
        Self::assemble(
            self.session.config().clone(),
            self.clock.clone(),
            self.durable.clone(),
            self.provider.clone(),
        )
    }

    fn assemble(
        config: SessionConfig,
        clock: MockClock,
        durable: MemoryStore,
        provider: Arc<MockIdentityProvider>,
    ) -> Self {
        let ephemeral = MemoryStore::new();
        let cookies = Arc::new(MemoryCookieJar::new());
        let validator = Arc::new(MockAuthorizationValidator::new());
        let session = match SessionManager::builder(config)
            .provider(provider.clone())
            .validator(validator.clone())
            .durable(Arc::new(durable.clone()))
            .ephemeral(Arc::new(ephemeral.clone()))
            .cookies(cookies.clone())
            .clock(Arc::new(clock.clone()))
            .build()
        {
            Ok(session) => session,
            Err(err) => panic!("test session failed to build: {err}"),
        };
        Self { clock, durable, ephemeral, cookies, provider, validator, session }
    }

    pub fn token_expiring_in(&self, secs: i64) -> String {
        token_expiring_in(&self.clock, secs, "jdoe")
    }

    /// Store a token pair whose access token expires in `secs`.
    pub fn seed_tokens(&self, secs: i64) -> TokenPair {
        let pair = TokenPair {
            access_token: self.token_expiring_in(secs),
            refresh_token: Some("seed-refresh".to_string()),
            expires_in: Some(secs),
        };
        if let Err(err) = self.session.tokens().save(&pair) {
            panic!("seeding tokens failed: {err}");
        }
        pair
    }
}

impl Default for SessionFixture {
    fn default() -> Self {
        Self::new()
    }
}
