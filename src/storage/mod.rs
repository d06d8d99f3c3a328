//! # Storage Module
//!
//! On-board record of every encoded frame.
//!
//! This module handles:
//! - The storage driver capability (`StorageDriver`)
//! - The logger sink whose last append result feeds the storage-ok status bit
//! - Rotating file storage on the host (`file`)

pub mod file;

use tracing::{debug, info, warn};

use crate::error::{FlightError, Result};

/// Storage driver capability
#[cfg_attr(test, mockall::automock)]
pub trait StorageDriver {
    /// Prepares the medium; `false` if it is unusable
    fn init(&mut self) -> bool;

    /// Appends one record; `false` if it was not written
    fn append(&mut self, bytes: &[u8]) -> bool;
}

/// Logger sink over a storage driver
///
/// Appends never block the transmit path: a failure is reported, recorded in
/// the storage-ok flag for the next frame, and the loop moves on.
pub struct LoggerSink {
    driver: Box<dyn StorageDriver + Send>,
    online: bool,
    last_ok: bool,
    appended: u64,
    failed: u64,
}

impl LoggerSink {
    pub fn new(driver: Box<dyn StorageDriver + Send>) -> Self {
        Self {
            driver,
            online: false,
            last_ok: false,
            appended: 0,
            failed: 0,
        }
    }

    /// Initialises the storage medium
    pub fn start(&mut self) -> bool {
        self.online = self.driver.init();
        self.last_ok = self.online;

        if self.online {
            info!("Storage initialised");
        } else {
            warn!("Storage failed to initialise, frames will not be logged");
        }

        self.online
    }

    /// Appends one frame
    ///
    /// # Errors
    ///
    /// Returns `FlightError::Storage` if storage is offline or the driver
    /// refused the write.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.online {
            self.last_ok = false;
            self.failed = self.failed.saturating_add(1);
            return Err(FlightError::Storage("storage not initialised".to_string()));
        }

        self.last_ok = self.driver.append(bytes);
        if self.last_ok {
            self.appended = self.appended.saturating_add(1);
            debug!("Logged frame ({} bytes)", bytes.len());
            Ok(())
        } else {
            self.failed = self.failed.saturating_add(1);
            Err(FlightError::Storage(format!(
                "append of {} bytes failed",
                bytes.len()
            )))
        }
    }

    /// Result of the most recent append (or of init before any append)
    pub fn is_ok(&self) -> bool {
        self.last_ok
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Records written
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Appends that failed
    pub fn failed(&self) -> u64 {
        self.failed
    }
}
