use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use serde_json::Value;
use sessiongate_core::{AuthError, AuthResult};
use tracing::debug;

use crate::errors::{status_error, InfraError};

const DEFAULT_USER_AGENT: &str = concat!("sessiongate/", env!("CARGO_PKG_VERSION"));

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: usize,
    backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry `n` (1-based): `backoff * 2^(n-1)`, capped at 2^8.
    fn delay(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(8) as u32;
        self.backoff.saturating_mul(1 << exponent)
    }

    fn has_retry_after(&self, attempt: usize) -> bool {
        attempt < self.attempts
    }
}

/// Shared HTTP client for every identity-server call.
///
/// 5xx responses and transport failures are retried with exponential
/// backoff. Anything else, 4xx included, is handed back on the first try.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn new() -> AuthResult<Self> {
        Self::builder().build()
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Send `builder`, retrying under the client's policy.
    ///
    /// The body must be cloneable (buffered) so it can be replayed.
    pub async fn send(&self, builder: RequestBuilder) -> AuthResult<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = builder
                .try_clone()
                .ok_or_else(|| AuthError::Http("streaming request bodies cannot be retried".into()))?
                .build()
                .map_err(InfraError::from)?;
            let method = request.method().clone();
            let url = redact(request.url());
            debug!(attempt, %method, %url, "http_request_sending");

            match self.client.execute(request).await {
                Ok(response) if !response.status().is_server_error() => {
                    debug!(attempt, %method, %url, status = %response.status(), "http_response_received");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, %method, %url, %status, "http_response_received");
                    if !self.retry.has_retry_after(attempt) {
                        return Ok(response);
                    }
                }
                Err(err) => {
                    debug!(attempt, %method, %url, error = %err, "http_request_failed");
                    if !(self.retry.has_retry_after(attempt) && is_transient(&err)) {
                        return Err(InfraError::from(err).into());
                    }
                }
            }

            let delay = self.retry.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// [`Self::send`], then read the body as JSON.
    ///
    /// Non-success statuses become [`status_error`]s carrying the body text.
    /// An empty body reads as `Value::Null`.
    pub async fn send_json(&self, builder: RequestBuilder) -> AuthResult<Value> {
        let response = self.send(builder).await?;
        let status = response.status();
        let text = response.text().await.map_err(InfraError::from)?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| InfraError::from(err).into())
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    retry: RetryPolicy,
    user_agent: String,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retry: RetryPolicy { attempts: 3, backoff: Duration::from_millis(250) },
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpClientBuilder {
    /// Per-request timeout, connect included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total tries per request, the first one included. Never below 1.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.retry.attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.retry.backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn build(self) -> AuthResult<HttpClient> {
        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .no_proxy()
            .build()
            .map_err(InfraError::from)?;
        Ok(HttpClient { client, retry: self.retry })
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// URL without its query string; authorization codes and tokens travel there.
fn redact(url: &reqwest::Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}
