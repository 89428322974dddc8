//! Profile endpoints of the identity provider.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use sessiongate_core::user_info::looks_like_silent_auth_failure;
use sessiongate_core::{AuthError, AuthResult, Claims, ProfileEndpoint, ProfileEnvelope, ProfileSource};
use tracing::{debug, instrument};

use crate::http::HttpClient;

/// [`ProfileSource`] backed by `/api/get-account`, `/api/userinfo` and
/// `/api/get-user`.
#[derive(Debug, Clone)]
pub struct HttpProfileSource {
    http: HttpClient,
    server_url: String,
}

impl HttpProfileSource {
    pub fn new(http: HttpClient, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self { http, server_url }
    }

    fn url_for(&self, endpoint: ProfileEndpoint, claims: &Claims) -> AuthResult<String> {
        let url = match endpoint {
            ProfileEndpoint::Account => format!("{}/api/get-account", self.server_url),
            ProfileEndpoint::UserInfo => format!("{}/api/userinfo", self.server_url),
            ProfileEndpoint::GetUser => {
                let owner = claims.owner.as_deref().filter(|o| !o.is_empty());
                let name = claims.name.as_deref().or(claims.preferred_username.as_deref());
                let (Some(owner), Some(name)) = (owner, name) else {
                    return Err(AuthError::ProfileUnavailable(
                        "token names no owner/user for get-user".into(),
                    ));
                };
                let id = format!("{owner}/{name}");
                format!("{}/api/get-user?id={}", self.server_url, urlencoding::encode(&id))
            }
        };
        Ok(url)
    }
}

/// `{status: "error", msg}` bodies. Auth-related messages become
/// `Unauthorized` so the fallback chain stops.
fn check_status(body: &Value) -> AuthResult<()> {
    if body.get("status").and_then(Value::as_str) != Some("error") {
        return Ok(());
    }
    let message = body.get("msg").and_then(Value::as_str).unwrap_or("profile request failed").to_string();
    if is_auth_message(&message) {
        return Err(AuthError::Unauthorized(message));
    }
    Err(AuthError::ProfileUnavailable(message))
}

/// Heuristic match for session or token failures in provider messages.
pub(crate) fn is_auth_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["unauthorized", "token", "sign in", "signin", "login", "expired", "not authenticated"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[async_trait]
impl ProfileSource for HttpProfileSource {
    #[instrument(skip_all, fields(endpoint = endpoint.as_str()))]
    async fn fetch(
        &self,
        endpoint: ProfileEndpoint,
        access_token: &str,
        claims: &Claims,
    ) -> AuthResult<ProfileEnvelope> {
        let url = self.url_for(endpoint, claims)?;
        let request = self.http.request(Method::GET, url).bearer_auth(access_token);
        let body = self.http.send_json(request).await?;

        match endpoint {
            ProfileEndpoint::Account => {
                if looks_like_silent_auth_failure(&body) {
                    debug!("account_endpoint_returned_empty_session");
                    return Err(AuthError::Unauthorized("account endpoint returned no session".into()));
                }
                check_status(&body)?;
                Ok(ProfileEnvelope::account_from_json(&body))
            }
            ProfileEndpoint::UserInfo => {
                check_status(&body)?;
                Ok(ProfileEnvelope::oidc_from_json(&body))
            }
            ProfileEndpoint::GetUser => {
                check_status(&body)?;
                Ok(ProfileEnvelope::user_from_json(&body))
            }
        }
    }
}
