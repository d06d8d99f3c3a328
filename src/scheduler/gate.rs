//! # Elapsed-Time Gate
//!
//! Answers "has at least `period` passed since I last fired?" and moves its
//! reference point to `now` when it does.

use crate::clock::{elapsed_ms, Millis};

/// Elapsed-time predicate with its own reference point
///
/// # Examples
///
/// ```
/// use flight_telemetry::scheduler::gate::ElapsedGate;
///
/// let mut gate = ElapsedGate::new(0);
/// assert!(!gate.fire_if_due(50, 100));
/// assert!(gate.fire_if_due(100, 100));
/// assert!(!gate.fire_if_due(150, 100));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElapsedGate {
    last_fire: Millis,
}

impl ElapsedGate {
    /// Creates a gate whose first window starts at `start`
    pub fn new(start: Millis) -> Self {
        Self { last_fire: start }
    }

    /// Returns `true` if at least `period` ms elapsed since the last fire
    ///
    /// On `true` the reference becomes `now` (not `last + period`), so a late
    /// pass does not shorten the following window. On `false` nothing changes.
    pub fn fire_if_due(&mut self, now: Millis, period: Millis) -> bool {
        if elapsed_ms(now, self.last_fire) >= period {
            self.last_fire = now;
            true
        } else {
            false
        }
    }

    /// Timestamp of the last fire (or the start reference)
    pub fn last_fire(&self) -> Millis {
        self.last_fire
    }
}
