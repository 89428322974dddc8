//! Ports for the network collaborators of the session layer.
//!
//! Implementations live in `sessiongate-infra` (reqwest) and in
//! [`crate::testing`] (in-memory doubles).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::{Claims, DecodedToken};
use crate::error::AuthResult;
use crate::token_store::TokenPair;
use crate::user_info::ProfileEnvelope;

/// Token endpoint response.
///
/// Some providers answer `200 OK` with an `error` body instead of tokens, so
/// every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// The token pair carried by this response, `None` without an access
    /// token.
    pub fn into_pair(self) -> Option<TokenPair> {
        let access_token = self.access_token.filter(|token| !token.is_empty())?;
        Some(TokenPair {
            access_token,
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            expires_in: self.expires_in,
        })
    }

    /// Provider error text, if the response carried one.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| match &self.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error.clone(),
        })
    }
}

/// OAuth2/PKCE identity provider client.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Prepare PKCE state and return the authorization URL to redirect to,
    /// optionally scoped to a named identity broker.
    fn authorization_url(&self, broker: Option<&str>) -> AuthResult<String>;

    /// Forget any PKCE verifier/state from an earlier login attempt.
    fn clear_pkce_state(&self);

    /// Exchange an authorization code (single use) for tokens.
    async fn exchange_code(&self, code: &str, state: &str) -> AuthResult<TokenResponse>;

    async fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<TokenResponse>;

    /// Best-effort server-side session invalidation.
    async fn revoke(&self, access_token: &str) -> AuthResult<()>;

    /// Provider-specific token parser. The built-in decoder is used when this
    /// returns `None`.
    fn parse_access_token(&self, _token: &str) -> Option<DecodedToken> {
        None
    }
}

/// Verdict of the remote authorization API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamValidation {
    pub valid: bool,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}

/// Remote authority that checks a bearer token.
#[async_trait]
pub trait AuthorizationValidator: Send + Sync {
    async fn validate(&self, access_token: &str) -> AuthResult<TeamValidation>;
}

/// Profile endpoints, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileEndpoint {
    Account,
    UserInfo,
    GetUser,
}

impl ProfileEndpoint {
    pub const FALLBACK_ORDER: [Self; 3] = [Self::Account, Self::UserInfo, Self::GetUser];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::UserInfo => "userinfo",
            Self::GetUser => "get-user",
        }
    }
}

/// Source of user profiles.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch one endpoint. `claims` identify the user for endpoints that need
    /// an explicit id.
    async fn fetch(
        &self,
        endpoint: ProfileEndpoint,
        access_token: &str,
        claims: &Claims,
    ) -> AuthResult<ProfileEnvelope>;
}

/// Raw image bytes and their media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Downloads avatar images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AuthResult<FetchedImage>;
}
