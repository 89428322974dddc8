//! Bearer-authenticated access to the application API.

pub mod client;

pub use client::ApiClient;
