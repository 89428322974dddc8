//! Route access policy.
//!
//! The guard only decides; performing the redirect is up to the caller.

use tracing::{debug, warn};

use crate::error::AuthError;
use crate::session::SessionManager;

/// What a route needs from the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteRequirement {
    pub requires_auth: bool,
    pub requires_admin: bool,
}

impl RouteRequirement {
    pub const PUBLIC: Self = Self { requires_auth: false, requires_admin: false };
    pub const PROTECTED: Self = Self { requires_auth: true, requires_admin: false };
    pub const ADMIN: Self = Self { requires_auth: true, requires_admin: true };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Send the user to login, then back to `return_to`
    RedirectToLogin { return_to: String },
    /// Signed in but not allowed here
    Forbidden,
}

#[derive(Debug, Clone)]
pub struct NavigationGuard {
    session: SessionManager,
}

impl NavigationGuard {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// Decide whether navigation to `path` may proceed.
    ///
    /// The auth callback route is always allowed so the code exchange can
    /// run. Admin routes consult the authorization API; without one
    /// configured, the token's own admin claims decide.
    pub async fn evaluate(&self, path: &str, requirement: RouteRequirement) -> GuardDecision {
        let route = path.split(['?', '#']).next().unwrap_or(path);
        if route == self.session.config().redirect_path {
            return GuardDecision::Allow;
        }
        if !requirement.requires_auth && !requirement.requires_admin {
            return GuardDecision::Allow;
        }

        if !self.session.validate_local_token().await {
            debug!(path, "guard_redirecting_to_login");
            return GuardDecision::RedirectToLogin { return_to: path.to_string() };
        }
        if !requirement.requires_admin {
            return GuardDecision::Allow;
        }

        match self.session.validate_with_team_api().await {
            Ok(validation) if !validation.valid => {
                GuardDecision::RedirectToLogin { return_to: path.to_string() }
            }
            Ok(validation) if validation.is_admin => GuardDecision::Allow,
            Ok(_) => GuardDecision::Forbidden,
            Err(AuthError::Config(_)) if self.session.is_admin() => GuardDecision::Allow,
            Err(err) => {
                warn!(path, error = %err, "guard_admin_check_failed");
                GuardDecision::Forbidden
            }
        }
    }
}
