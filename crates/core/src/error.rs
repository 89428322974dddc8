//! Error taxonomy for session and token operations.

use sessiongate_common::{ErrorClassification, ErrorSeverity, StorageError};
use thiserror::Error;

/// Errors surfaced by the session layer.
///
/// `Clone` so that one refresh outcome can be shared by every caller that
/// joined the same in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no access token available")]
    NoToken,

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token could not be decoded: {0}")]
    TokenDecode(String),

    #[error("access token expired")]
    TokenExpired,

    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("remote validation failed: {0}")]
    RemoteValidationFailed(String),

    #[error("lock '{0}' is still held by another context")]
    AuthConflict(String),

    #[error("storage quota exceeded")]
    StorageQuotaExceeded,

    #[error("state mismatch: expected {expected}, received {received}")]
    StateMismatch { expected: String, received: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("user profile unavailable: {0}")]
    ProfileUnavailable(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for session operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QuotaExceeded { .. } => Self::StorageQuotaExceeded,
            other => Self::Storage(other.to_string()),
        }
    }
}

impl ErrorClassification for AuthError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RemoteValidationFailed(_) | Self::AuthConflict(_))
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoToken | Self::NoRefreshToken | Self::TokenExpired => ErrorSeverity::Info,
            Self::AuthConflict(_)
            | Self::StorageQuotaExceeded
            | Self::ProfileUnavailable(_)
            | Self::Http(_)
            | Self::RemoteValidationFailed(_) => ErrorSeverity::Warning,
            Self::TokenDecode(_)
            | Self::ExchangeFailed(_)
            | Self::RefreshFailed(_)
            | Self::Unauthorized(_)
            | Self::Storage(_) => ErrorSeverity::Error,
            Self::StateMismatch { .. } | Self::Config(_) => ErrorSeverity::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_quota_maps_to_quota_variant() {
        let err: AuthError = StorageError::QuotaExceeded { key: "k".into() }.into();
        assert_eq!(err, AuthError::StorageQuotaExceeded);

        let err: AuthError = StorageError::Unavailable("blocked".into()).into();
        assert!(matches!(err, AuthError::Storage(_)));
    }

    #[test]
    fn test_classification() {
        assert!(AuthError::Http("timeout".into()).is_retryable());
        assert!(!AuthError::RefreshFailed("invalid_grant".into()).is_retryable());
        assert!(AuthError::StateMismatch { expected: "a".into(), received: "b".into() }
            .is_critical());
    }
}
