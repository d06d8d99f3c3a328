//! # Clock Module
//!
//! Monotonic millisecond time for the scheduler.
//!
//! The counter is a `u32` and wraps after ~49.7 days. Consumers must only
//! ever compare timestamps through [`elapsed_ms`], never absolutely.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Milliseconds since start, wrapping at `u32::MAX`
pub type Millis = u32;

/// Wraparound-safe elapsed time between two timestamps
#[inline]
pub fn elapsed_ms(now: Millis, since: Millis) -> Millis {
    now.wrapping_sub(since)
}

/// Source of monotonic milliseconds
pub trait Clock {
    /// Current time in milliseconds since start
    fn now_ms(&self) -> Millis;
}

/// Clock backed by `std::time::Instant`
///
/// The 64-bit elapsed time is truncated to the 32-bit counter so it wraps the
/// same way a microcontroller `millis()` counter does.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

/// Clock whose time only moves when told to
///
/// Cloning shares the underlying counter, so simulated devices and the
/// scheduler observe the same time.
///
/// # Examples
///
/// ```
/// use flight_telemetry::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// clock.advance(150);
/// assert_eq!(clock.now_ms(), 150);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Creates a clock starting at 0 ms
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a clock starting at the given time
    pub fn starting_at(ms: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(ms)),
        }
    }

    /// Sets the absolute time
    pub fn set(&self, ms: Millis) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Advances time, wrapping at `u32::MAX`
    pub fn advance(&self, ms: Millis) {
        let current = self.now.load(Ordering::SeqCst);
        self.now.store(current.wrapping_add(ms), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_simple() {
        assert_eq!(elapsed_ms(150, 100), 50);
        assert_eq!(elapsed_ms(100, 100), 0);
    }

    #[test]
    fn test_elapsed_across_wraparound() {
        // 10 ms before overflow to 20 ms after
        let before = u32::MAX - 9;
        assert_eq!(elapsed_ms(20, before), 30);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();

        clock.advance(40);
        assert_eq!(other.now_ms(), 40);

        other.set(1000);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn test_manual_clock_wraps() {
        let clock = ManualClock::starting_at(u32::MAX - 4);
        clock.advance(10);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(elapsed_ms(second, first) < 1000);
    }
}
