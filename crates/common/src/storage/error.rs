//! Storage error types

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Errors raised by key-value stores and cookie jars.
///
/// Browser-style storage is synchronous but can still fail: capacity is
/// limited and privacy settings may block access outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage quota exceeded while writing '{key}'")]
    QuotaExceeded { key: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored value is malformed: {0}")]
    Serialization(String),
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// True when the failure is a capacity problem that eviction could fix.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ErrorClassification for StorageError {
    fn is_retryable(&self) -> bool {
        // Quota errors clear once something is evicted
        matches!(self, Self::QuotaExceeded { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::QuotaExceeded { .. } => ErrorSeverity::Warning,
            Self::Unavailable(_) => ErrorSeverity::Error,
            Self::Serialization(_) => ErrorSeverity::Warning,
        }
    }
}
