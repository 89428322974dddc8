//! Session orchestration.
//!
//! [`SessionManager`] owns the token pair: login initiation, code exchange,
//! refresh scheduling, the three validation tiers, logout, and
//! synchronization with other contexts sharing the same storage.

mod manager;
mod state;
mod validation;

pub use manager::{SessionManager, SessionManagerBuilder};
pub use state::{CheckOutcome, SessionEvent, SessionState};
pub use validation::fingerprint;
