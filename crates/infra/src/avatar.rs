//! Avatar image downloads.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use sessiongate_core::{AuthError, AuthResult, FetchedImage, ImageFetcher};
use tracing::debug;

use crate::errors::{status_error, InfraError};
use crate::http::HttpClient;

const FALLBACK_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: HttpClient,
}

impl HttpImageFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> AuthResult<FetchedImage> {
        let response = self.http.send(self.http.request(Method::GET, url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, ""));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(AuthError::Http(format!("not an image: {content_type}")));
        }

        let bytes = response.bytes().await.map_err(InfraError::from)?.to_vec();
        debug!(size = bytes.len(), %content_type, "avatar_downloaded");
        Ok(FetchedImage { bytes, content_type })
    }
}
