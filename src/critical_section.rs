//! # Critical Section
//!
//! The one piece of mutual exclusion in the loop. The GPS receive interrupt
//! runs its body inside it, and so does the altimeter read, which keeps
//! interrupt-driven bus traffic out of an in-flight barometer transaction.
//!
//! Bodies run inside the section must be short: a byte append, a single
//! register read.

use std::sync::{Arc, Mutex, PoisonError};

/// Shared handle to the critical section
///
/// # Examples
///
/// ```
/// use flight_telemetry::critical_section::CriticalSection;
///
/// let cs = CriticalSection::new();
/// let value = cs.with(|| 40 + 2);
/// assert_eq!(value, 42);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CriticalSection {
    lock: Arc<Mutex<()>>,
}

impl CriticalSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with the section held
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        // A panicking holder leaves nothing half-written behind the unit value
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
