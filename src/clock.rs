//! Monotonic time source behind a trait, so duration logic is testable.
//!
//! Every debounce, silence-run, and rotation comparison in the crate goes
//! through [`Clock`]; wall-clock time (segment names, upload timestamps) is
//! handled separately with `chrono`.

use std::time::Instant;

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
