//! OAuth 2.0 authorization-code client with PKCE.
//!
//! Endpoints follow the identity provider's layout:
//!
//! ```text
//!   GET  /login/oauth/authorize             browser redirect
//!   POST /api/login/oauth/access_token      code exchange
//!   POST /api/login/oauth/refresh_token     refresh grant
//!   POST /api/logout                        server-side sign out
//! ```
//!
//! The verifier and state of the pending login live in the ephemeral store,
//! so a reload between redirect and callback does not lose them.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use sessiongate_common::KeyValueStore;
use sessiongate_core::{AuthError, AuthResult, IdentityProvider, SessionConfig, TokenResponse};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::pkce::PkceChallenge;
use crate::errors::InfraError;
use crate::http::HttpClient;

pub const PKCE_VERIFIER_KEY: &str = "pkce_code_verifier";
pub const PKCE_STATE_KEY: &str = "pkce_state";

const DEFAULT_SCOPE: &str = "openid profile email offline_access";

/// [`IdentityProvider`] talking HTTP to the configured server.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    config: SessionConfig,
    http: HttpClient,
    ephemeral: Arc<dyn KeyValueStore>,
    scope: String,
}

impl HttpIdentityProvider {
    pub fn new(config: SessionConfig, http: HttpClient, ephemeral: Arc<dyn KeyValueStore>) -> Self {
        Self { config, http, ephemeral, scope: DEFAULT_SCOPE.to_string() }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.server_base(), path)
    }

    fn pending_state(&self) -> Option<(String, String)> {
        let state = self.ephemeral.get(PKCE_STATE_KEY).ok().flatten()?;
        let verifier = self.ephemeral.get(PKCE_VERIFIER_KEY).ok().flatten()?;
        Some((state, verifier))
    }

    /// POST a token grant. `fail` wraps provider-side rejections; transport
    /// and server errors stay retryable `Http` errors.
    async fn token_request(
        &self,
        path: &str,
        form: &[(&str, &str)],
        fail: fn(String) -> AuthError,
    ) -> AuthResult<TokenResponse> {
        let request = self
            .http
            .request(Method::POST, self.endpoint(path))
            .header("Accept", "application/json")
            .form(form);
        let response = self.http.send(request).await?;
        let status = response.status();
        let text = response.text().await.map_err(InfraError::from)?;

        if status.is_server_error() {
            return Err(AuthError::Http(format!("HTTP {}", status.as_u16())));
        }

        let parsed: TokenResponse = serde_json::from_str(&text).unwrap_or_default();
        if !status.is_success() {
            let message = parsed.error_message().unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(fail(message));
        }
        Ok(parsed)
    }
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("server_url", &self.config.server_url)
            .field("client_id", &self.config.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorization_url(&self, broker: Option<&str>) -> AuthResult<String> {
        let challenge = PkceChallenge::generate();
        self.ephemeral.set(PKCE_VERIFIER_KEY, &challenge.code_verifier)?;
        self.ephemeral.set(PKCE_STATE_KEY, &challenge.state)?;

        let mut url = Url::parse(&self.endpoint("/login/oauth/authorize")).map_err(InfraError::from)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.config.redirect_uri())
                .append_pair("scope", &self.scope)
                .append_pair("state", &challenge.state)
                .append_pair("code_challenge_method", PkceChallenge::METHOD)
                .append_pair("code_challenge", &challenge.code_challenge);
            if let Some(broker) = broker.filter(|b| !b.is_empty()) {
                query.append_pair("provider", broker);
            }
        }

        debug!(broker = broker.unwrap_or(""), "authorization_url_built");
        Ok(url.into())
    }

    fn clear_pkce_state(&self) {
        for key in [PKCE_VERIFIER_KEY, PKCE_STATE_KEY] {
            if let Err(err) = self.ephemeral.remove(key) {
                warn!(key, error = %err, "pkce_state_clear_failed");
            }
        }
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str, state: &str) -> AuthResult<TokenResponse> {
        let (expected, verifier) = self
            .pending_state()
            .ok_or_else(|| AuthError::ExchangeFailed("no pending login for this callback".into()))?;
        if expected != state {
            return Err(AuthError::StateMismatch { expected, received: state.to_string() });
        }
        // Codes and verifiers are single use.
        self.clear_pkce_state();

        let redirect_uri = self.config.redirect_uri();
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        let response = self.token_request("/api/login/oauth/access_token", &form, AuthError::ExchangeFailed).await?;
        info!("authorization_code_exchanged");
        Ok(response)
    }

    #[instrument(skip_all)]
    async fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        if refresh_token.is_empty() {
            return Err(AuthError::NoRefreshToken);
        }
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("scope", self.scope.as_str()),
        ];
        self.token_request("/api/login/oauth/refresh_token", &form, AuthError::RefreshFailed).await
    }

    async fn revoke(&self, access_token: &str) -> AuthResult<()> {
        let request = self
            .http
            .request(Method::POST, self.endpoint("/api/logout"))
            .bearer_auth(access_token)
            .form(&[("id_token_hint", access_token)]);
        self.http.send_json(request).await?;
        Ok(())
    }
}
