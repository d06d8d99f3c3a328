//! Periodic task records iterated by the scheduler in priority order.

use super::gate::ElapsedGate;
use crate::clock::Millis;

/// Work a periodic task performs when its gate fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Sample, encode, log, transmit
    Telemetry,
    /// Sample battery voltage and recompute the low-battery flag
    BatteryCheck,
}

/// A periodic activity with its own gate
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTask {
    /// Task name for logging
    pub name: &'static str,

    /// What runs when due
    pub kind: TaskKind,

    /// Minimum time between runs
    pub period_ms: Millis,

    gate: ElapsedGate,

    runs: u64,
}

impl PeriodicTask {
    pub fn new(name: &'static str, kind: TaskKind, period_ms: Millis, start: Millis) -> Self {
        Self {
            name,
            kind,
            period_ms,
            gate: ElapsedGate::new(start),
            runs: 0,
        }
    }

    /// Polls the gate; counts the run when it fires
    pub fn poll(&mut self, now: Millis) -> bool {
        let due = self.gate.fire_if_due(now, self.period_ms);
        if due {
            self.runs = self.runs.saturating_add(1);
        }
        due
    }

    /// Number of times this task has fired
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Time of the last fire
    pub fn last_fire(&self) -> Millis {
        self.gate.last_fire()
    }
}
