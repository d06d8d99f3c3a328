//! # Status Indicator
//!
//! Single on/off indicator (an LED on the vehicle). Lit at startup when the
//! radio failed to come up.

use tracing::{info, warn};

/// Status indicator capability
#[cfg_attr(test, mockall::automock)]
pub trait StatusIndicator {
    fn set(&mut self, on: bool);
}

/// Indicator for hosts without an LED: state changes go to the log
#[derive(Debug, Default)]
pub struct LogIndicator {
    lit: bool,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }
}

impl StatusIndicator for LogIndicator {
    fn set(&mut self, on: bool) {
        if on && !self.lit {
            warn!("Status indicator ON");
        } else if !on && self.lit {
            info!("Status indicator off");
        }
        self.lit = on;
    }
}
