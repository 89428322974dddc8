//! Identity provider and authorization API adapters.

pub mod pkce;
pub mod provider;
pub mod validator;

pub use pkce::PkceChallenge;
pub use provider::HttpIdentityProvider;
pub use validator::HttpAuthorizationValidator;
