//! Conversions from external infrastructure errors into session errors.

use reqwest::{Error as HttpError, StatusCode};
use sessiongate_core::AuthError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the session error.
#[derive(Debug)]
pub struct InfraError(pub AuthError);

impl From<InfraError> for AuthError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<AuthError> for InfraError {
    fn from(value: AuthError) -> Self {
        InfraError(value)
    }
}

trait IntoAuthError {
    fn into_auth(self) -> AuthError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → AuthError */
/* -------------------------------------------------------------------------- */

impl IntoAuthError for HttpError {
    fn into_auth(self) -> AuthError {
        if self.is_timeout() {
            return AuthError::Http("HTTP request timed out".into());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return AuthError::Http("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            return status_error(status, "");
        }

        if self.is_decode() {
            return AuthError::Http(format!("malformed response body: {self}"));
        }

        AuthError::Http(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_auth())
    }
}

/* -------------------------------------------------------------------------- */
/* url / serde_json → AuthError */
/* -------------------------------------------------------------------------- */

impl From<url::ParseError> for InfraError {
    fn from(value: url::ParseError) -> Self {
        InfraError(AuthError::Config(format!("invalid url: {value}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(AuthError::Http(format!("invalid JSON body: {value}")))
    }
}

/// Map a non-success status to the matching session error. `body` is
/// appended when not empty.
pub fn status_error(status: StatusCode, body: &str) -> AuthError {
    let code = status.as_u16();
    let mut message = format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
    let body = body.trim();
    if !body.is_empty() {
        message.push_str(": ");
        message.push_str(body);
    }

    match code {
        401 | 403 => AuthError::Unauthorized(message),
        _ => AuthError::Http(message),
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::Client;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn status_error_maps_auth_codes() {
        assert!(matches!(status_error(StatusCode::UNAUTHORIZED, ""), AuthError::Unauthorized(_)));
        assert!(matches!(status_error(StatusCode::FORBIDDEN, ""), AuthError::Unauthorized(_)));

        match status_error(StatusCode::BAD_GATEWAY, "upstream down") {
            AuthError::Http(message) => {
                assert_eq!(message, "HTTP 502 Bad Gateway: upstream down");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reqwest_status_error_converts_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(401)).mount(&server).await;

        let err = Client::new()
            .get(server.uri())
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap_err();

        let converted: AuthError = InfraError::from(err).into();
        assert!(matches!(converted, AuthError::Unauthorized(_)));
    }

    #[test]
    fn url_errors_are_config_errors() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: AuthError = InfraError::from(err).into();
        assert!(matches!(converted, AuthError::Config(_)));
    }
}
