//! Error classification shared by every SessionGate error type.
//!
//! Each crate owns its own `thiserror` enum. This module only supplies the
//! two questions asked of any failure: can it be retried, and how loud
//! should its log line be.

use std::fmt;

/// Implemented by every error enum in the workspace.
pub trait ErrorClassification {
    /// Transient failures (network, lock contention) that a second attempt
    /// may clear.
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

/// Log level a failure is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected outcome such as a missing token.
    Info,
    Warning,
    Error,
    /// Misconfiguration or a forged callback.
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

/// Emit `event` at the level matching the error's severity.
pub fn report<E>(event: &str, err: &E)
where
    E: ErrorClassification + fmt::Display,
{
    let severity = err.severity();
    match severity {
        ErrorSeverity::Info => tracing::info!(error = %err, "{event}"),
        ErrorSeverity::Warning => tracing::warn!(error = %err, "{event}"),
        ErrorSeverity::Error | ErrorSeverity::Critical => {
            tracing::error!(error = %err, %severity, "{event}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct LockBusy;

    impl fmt::Display for LockBusy {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("lock busy")
        }
    }

    impl ErrorClassification for LockBusy {
        fn is_retryable(&self) -> bool {
            true
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Warning
        }
    }

    /// Validates `ErrorClassification::is_critical` behavior for the
    /// warning-level error scenario.
    ///
    /// Assertions:
    /// - Ensures a retryable warning is not critical.
    /// - Ensures reporting it does not panic without a subscriber.
    #[test]
    fn test_warning_is_not_critical() {
        assert!(LockBusy.is_retryable());
        assert!(!LockBusy.is_critical());
        report("lock_contended", &LockBusy);
    }

    #[test]
    fn test_severity_ordering_and_display() {
        assert!(ErrorSeverity::Critical > ErrorSeverity::Error);
        assert!(ErrorSeverity::Warning > ErrorSeverity::Info);
        assert_eq!(ErrorSeverity::Warning.to_string(), "warn");
    }
}
