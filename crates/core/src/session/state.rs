//! Session states, events and check outcomes.

/// Lifecycle of the local session.
///
/// ```text
/// Anonymous ──start_login──► Authenticating ──signin_with_code──► Authenticated
///     ▲                                                            │      ▲
///     │                                                   refresh  ▼      │ ok
///     └──────── logout ◄──── Invalid ◄──────── failure ─────── Refreshing ┘
/// ```
///
/// Any state returns to `Anonymous` on logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
    Invalid,
}

/// Notifications broadcast to in-process listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The access token was issued, refreshed, or replaced by another context
    TokenChanged,
    /// The session can no longer be used; listeners should send the user to
    /// login
    InvalidAuth { reason: String },
    LoggedOut,
}

/// Result of one background auth check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Another check was running, or trust/recent validation made it
    /// unnecessary
    Skipped,
    NoSession,
    Valid,
    Refreshed,
    Failed,
}
