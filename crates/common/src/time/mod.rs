//! Time utilities and abstractions
//!
//! - **[`clock`]**: real and mock wall/monotonic time for testability
//! - **[`timer`]**: cancellable one-shot and recurring async timers

pub mod clock;
#[cfg(feature = "runtime")]
pub mod timer;

pub use clock::{Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use timer::TimerHandle;
