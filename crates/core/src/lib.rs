//! # SessionGate Core
//!
//! Session and token lifecycle logic with no network or platform code.
//!
//! This crate contains:
//! - Cooperative storage-backed locks and trust flags
//! - Dual-backend token persistence and token decoding
//! - The [`SessionManager`] state machine (signin, refresh, validation,
//!   logout, cross-context sync)
//! - User-info and avatar caches built on top of the session
//! - Port traits for every network collaborator
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────┐
//!   UI / guard ──►│    SessionManager    │──► IdentityProvider (port)
//!                 │  state · timers ·    │──► AuthorizationValidator (port)
//!                 │  events              │
//!                 └──┬────────┬────────┬─┘
//!                    │        │        │
//!            StorageLock  TrustFlags  TokenStore ──► durable store + cookies
//!                    │
//!      UserInfoCache ┘──► ProfileSource (port)
//!      AvatarCache ─────► ImageFetcher (port)
//! ```
//!
//! All I/O goes through `sessiongate_common::storage` and the traits in
//! [`ports`]; adapters live in `sessiongate-infra`.

pub mod avatar;
pub mod codec;
pub mod config;
pub mod error;
pub mod flags;
pub mod guard;
pub mod lock;
pub mod ports;
pub mod session;
pub mod testing;
pub mod token_store;
pub mod user_info;

pub use avatar::AvatarCache;
pub use codec::{Claims, DecodedToken};
pub use config::{LockTimeouts, SessionConfig, Timings};
pub use error::{AuthError, AuthResult};
pub use flags::{TrustFlag, TrustFlags, TrustLevel};
pub use guard::{GuardDecision, NavigationGuard, RouteRequirement};
pub use lock::{LockName, StorageLock};
pub use ports::{
    AuthorizationValidator, FetchedImage, IdentityProvider, ImageFetcher, ProfileEndpoint,
    ProfileSource, TeamValidation, TokenResponse,
};
pub use session::{CheckOutcome, SessionEvent, SessionManager, SessionState};
pub use token_store::{TokenPair, TokenStore};
pub use user_info::{ProfileEnvelope, UserInfo, UserInfoCache};
