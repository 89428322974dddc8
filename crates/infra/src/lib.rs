//! # SessionGate Infrastructure
//!
//! HTTP implementations of the `sessiongate-core` ports.
//!
//! This crate contains:
//! - The shared retrying HTTP client
//! - The OAuth 2.0 + PKCE identity provider client
//! - Authorization API, profile and avatar clients
//! - The bearer-injecting application API client
//! - Configuration loading from the environment and files
//!
//! ## Architecture
//! - Implements traits defined in `sessiongate-core`
//! - Contains all network and filesystem code

pub mod api;
pub mod auth;
pub mod avatar;
pub mod config;
pub mod errors;
pub mod http;
pub mod profile;
pub mod stack;

pub use api::ApiClient;
pub use auth::{HttpAuthorizationValidator, HttpIdentityProvider, PkceChallenge};
pub use avatar::HttpImageFetcher;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use profile::HttpProfileSource;
pub use stack::{ContextStores, HttpStack};
