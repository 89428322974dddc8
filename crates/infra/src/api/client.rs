//! Application API client that rides on the current session.
//!
//! Every request carries the session's bearer token. Responses are screened
//! for expired-session signals, including the ones some backends hide inside
//! a `200 OK` body; any hit invalidates the session before the error is
//! returned.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sessiongate_core::user_info::looks_like_silent_auth_failure;
use sessiongate_core::{AuthError, AuthResult, SessionManager};
use tracing::{debug, instrument, warn};

use crate::errors::{status_error, InfraError};
use crate::http::HttpClient;
use crate::profile::is_auth_message;

/// Bearer-injecting JSON client for the application's own API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    session: SessionManager,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: HttpClient, session: SessionManager, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, session, base_url }
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> AuthResult<R> {
        self.execute(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &T) -> AuthResult<R> {
        self.execute(Method::POST, path, Some(body)).await
    }

    pub async fn put<T: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &T) -> AuthResult<R> {
        self.execute(Method::PUT, path, Some(body)).await
    }

    pub async fn del<R: DeserializeOwned>(&self, path: &str) -> AuthResult<R> {
        self.execute(Method::DELETE, path, None::<&()>).await
    }

    #[instrument(skip_all, fields(method = %method, path = %path))]
    async fn execute<T: Serialize + Sync, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> AuthResult<R> {
        let token = self.session.access_token().ok_or(AuthError::NoToken)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method, url).bearer_auth(token).header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.http.send(request).await?;
        let status = response.status();
        let text = response.text().await.map_err(InfraError::from)?;

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(self.reject(status_error(status, &text)).await);
        }
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(InfraError::from)?
        };
        if let Some(reason) = auth_failure_in_body(&value) {
            return Err(self.reject(AuthError::Unauthorized(reason)).await);
        }

        debug!(%status, "api_request_succeeded");
        serde_json::from_value(value).map_err(|err| InfraError::from(err).into())
    }

    async fn reject(&self, err: AuthError) -> AuthError {
        warn!(error = %err, "api_rejected_session");
        self.session.invalidate(&err).await;
        err
    }
}

/// Expired-session signals inside a successful response body.
fn auth_failure_in_body(body: &Value) -> Option<String> {
    let message = body
        .get("msg")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if body.get("status").and_then(Value::as_str) == Some("error") && is_auth_message(message) {
        return Some(message.to_string());
    }
    if let Some(code @ (401 | 403)) = body.get("code").and_then(Value::as_u64) {
        return Some(format!("response code {code}"));
    }
    if looks_like_silent_auth_failure(body) {
        return Some("empty session envelope".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    //! Unit tests for api::client.

    use serde_json::json;

    use super::*;

    /// Validates `auth_failure_in_body` behavior for the body signal
    /// scenarios.
    ///
    /// Assertions:
    /// - Ensures error statuses with auth messages are detected.
    /// - Ensures embedded 401/403 codes are detected.
    /// - Ensures the empty session envelope is detected.
    /// - Ensures ordinary errors and payloads pass through.
    #[test]
    fn test_auth_failure_in_body() {
        assert!(auth_failure_in_body(&json!({"status": "error", "msg": "Please login first"})).is_some());
        assert!(auth_failure_in_body(&json!({"code": 403, "message": "denied"})).is_some());
        assert!(auth_failure_in_body(&json!({"status": "ok", "sub": "", "name": "", "data": true})).is_some());

        assert!(auth_failure_in_body(&json!({"status": "error", "msg": "disk full"})).is_none());
        assert!(auth_failure_in_body(&json!({"status": "ok", "data": {"id": 1}})).is_none());
        assert!(auth_failure_in_body(&json!([1, 2, 3])).is_none());
        assert!(auth_failure_in_body(&Value::Null).is_none());
    }
}
