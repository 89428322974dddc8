//! Client for the application's authorization API.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use sessiongate_core::{AuthError, AuthResult, AuthorizationValidator, TeamValidation};
use tracing::{debug, instrument};

use crate::http::HttpClient;

#[derive(Debug, Deserialize)]
struct ValidationEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<TeamValidation>,
    #[serde(default)]
    message: Option<String>,
}

/// Asks `GET <validate_url>` whether the bearer may use this application.
///
/// The endpoint answers `{success, data: {valid, isAdmin}}`. A 401/403 is a
/// verdict (`valid: false`); any other failure is `RemoteValidationFailed`.
#[derive(Debug, Clone)]
pub struct HttpAuthorizationValidator {
    http: HttpClient,
    url: String,
}

impl HttpAuthorizationValidator {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait]
impl AuthorizationValidator for HttpAuthorizationValidator {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn validate(&self, access_token: &str) -> AuthResult<TeamValidation> {
        let request = self.http.request(Method::GET, &self.url).bearer_auth(access_token);
        let body = match self.http.send_json(request).await {
            Ok(body) => body,
            Err(AuthError::Unauthorized(message)) => {
                debug!(message, "authorization_api_denied");
                return Ok(TeamValidation { valid: false, is_admin: false });
            }
            Err(err) => return Err(AuthError::RemoteValidationFailed(err.to_string())),
        };

        let envelope: ValidationEnvelope = serde_json::from_value(body)
            .map_err(|err| AuthError::RemoteValidationFailed(format!("unexpected body: {err}")))?;

        match envelope {
            ValidationEnvelope { success: true, data: Some(verdict), .. } => Ok(verdict),
            ValidationEnvelope { success: true, data: None, .. } => {
                Err(AuthError::RemoteValidationFailed("response carried no verdict".into()))
            }
            ValidationEnvelope { success: false, message, .. } => {
                debug!(message = message.as_deref().unwrap_or(""), "authorization_api_rejected");
                Ok(TeamValidation { valid: false, is_admin: false })
            }
        }
    }
}
