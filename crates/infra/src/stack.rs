//! Wires the HTTP adapters into a session.

use std::sync::Arc;

use sessiongate_common::{CookieJar, KeyValueStore};
use sessiongate_core::{AuthResult, AvatarCache, SessionConfig, SessionManager, UserInfoCache};

use crate::api::ApiClient;
use crate::auth::{HttpAuthorizationValidator, HttpIdentityProvider};
use crate::avatar::HttpImageFetcher;
use crate::http::HttpClient;
use crate::profile::HttpProfileSource;

/// Storage surfaces of one execution context.
#[derive(Clone)]
pub struct ContextStores {
    pub durable: Arc<dyn KeyValueStore>,
    pub ephemeral: Arc<dyn KeyValueStore>,
    pub cookies: Arc<dyn CookieJar>,
}

/// A session backed by the HTTP adapters, plus the caches built on it.
#[derive(Debug, Clone)]
pub struct HttpStack {
    pub session: SessionManager,
    pub http: HttpClient,
    profiles: Arc<HttpProfileSource>,
    images: Arc<HttpImageFetcher>,
}

impl HttpStack {
    /// Build the session. The validator is only installed when the config
    /// names a `validate_url`.
    pub fn connect(config: SessionConfig, stores: ContextStores, http: HttpClient) -> AuthResult<Self> {
        config.validate()?;
        let provider = HttpIdentityProvider::new(config.clone(), http.clone(), stores.ephemeral.clone());

        let mut builder = SessionManager::builder(config.clone())
            .provider(Arc::new(provider))
            .durable(stores.durable)
            .ephemeral(stores.ephemeral)
            .cookies(stores.cookies);
        if let Some(url) = config.validate_url.as_deref() {
            builder = builder.validator(Arc::new(HttpAuthorizationValidator::new(http.clone(), url)));
        }
        let session = builder.build()?;

        Ok(Self {
            session,
            profiles: Arc::new(HttpProfileSource::new(http.clone(), config.server_url.clone())),
            images: Arc::new(HttpImageFetcher::new(http.clone())),
            http,
        })
    }

    pub fn user_info(&self) -> UserInfoCache {
        UserInfoCache::new(self.session.clone(), self.profiles.clone())
    }

    pub fn avatars(&self) -> AvatarCache {
        AvatarCache::for_session(&self.session, self.images.clone())
    }

    pub fn api(&self, base_url: impl Into<String>) -> ApiClient {
        ApiClient::new(self.http.clone(), self.session.clone(), base_url)
    }
}
