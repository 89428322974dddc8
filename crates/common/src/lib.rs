//! Shared foundation for the SessionGate crates.
//!
//! # Feature Tiers
//!
//! - always on: error classification, clock abstraction, key-value storage
//!   contracts, cookie jar
//! - `runtime` (default): tokio timers and the in-memory store with change
//!   broadcasts
//! - `observability`: `tracing-subscriber` bootstrap

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod storage;
pub mod time;

#[cfg(feature = "observability")]
pub mod observability;

pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use storage::MemoryStore;
pub use storage::{
    CookieJar, CookieOptions, KeyValueStore, MemoryCookieJar, SameSite, StorageError,
    StorageEvent, StorageResult,
};
pub use time::{Clock, MockClock, SystemClock};
