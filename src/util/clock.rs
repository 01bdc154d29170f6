//! Monotonic clock helpers.
//!
//! The pool and orchestrator only ever reason about elapsed durations
//! (deadlines, idle ages, performance timing), never wall-clock instants, so
//! everything here is built on [`std::time::Instant`].

use std::time::Instant;

/// A monotonic timestamp, opaque outside duration arithmetic.
pub type Timestamp = Instant;

/// The current monotonic timestamp.
#[must_use]
pub fn monotonic_now() -> Timestamp {
    Instant::now()
}
