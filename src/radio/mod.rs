//! # Radio Module
//!
//! Half-duplex radio link driven without ever waiting on it.
//!
//! This module handles:
//! - The radio driver capability (`RadioDriver`)
//! - The gatekeeper state machine: Idle → submit → Transmitting → complete → Idle
//! - At most one frame in flight; a frame offered while busy is dropped
//! - A serial-attached modem driver (`serial`)

pub mod serial;

use tracing::{debug, info, warn};

/// Default carrier frequency in MHz
pub const DEFAULT_FREQUENCY_MHZ: f32 = 915.0;

/// Default transmit power in dBm
pub const DEFAULT_TX_POWER_DBM: i8 = 23;

/// Mode reported by the radio hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Idle,
    Transmitting,
    Receiving,
}

/// Radio driver capability
#[cfg_attr(test, mockall::automock)]
pub trait RadioDriver {
    /// Brings the radio up; `false` if it is unusable
    fn init(&mut self) -> bool;

    /// Tunes the carrier; `false` if the frequency was refused
    fn set_frequency(&mut self, mhz: f32) -> bool;

    /// Sets transmit power
    fn set_power(&mut self, dbm: i8);

    /// Current hardware mode
    fn current_mode(&self) -> RadioMode;

    /// Starts transmitting `frame` and returns immediately
    fn send(&mut self, frame: &[u8]);

    /// Total packets the hardware reports as sent (wrapping)
    fn sent_packet_count(&self) -> u16;
}

/// Link state as seen by the gatekeeper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Transmitting,
}

/// Why a frame was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A previous frame is still in flight, or the radio is receiving
    Busy,
    /// The radio failed to initialise
    Offline,
}

/// Outcome of offering a frame to the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted)
    }
}

/// Owner of the radio and its link state
///
/// Rejection is the normal outcome while a frame is in flight. Rejected frames
/// are not kept: the next telemetry cycle produces a fresh frame instead.
pub struct RadioGatekeeper {
    driver: Box<dyn RadioDriver + Send>,
    state: LinkState,
    online: bool,
    accepted: u64,
    rejected: u64,
}

impl RadioGatekeeper {
    pub fn new(driver: Box<dyn RadioDriver + Send>) -> Self {
        Self {
            driver,
            state: LinkState::Idle,
            online: false,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Initialises and tunes the radio
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if the radio is usable; otherwise every submit is
    ///   rejected as `Offline`
    pub fn start(&mut self, frequency_mhz: f32, tx_power_dbm: i8) -> bool {
        if !self.driver.init() {
            warn!("Radio init failed");
            self.online = false;
            return false;
        }

        if !self.driver.set_frequency(frequency_mhz) {
            warn!("Radio refused frequency {} MHz", frequency_mhz);
            self.online = false;
            return false;
        }

        self.driver.set_power(tx_power_dbm);
        info!("Radio up at {} MHz, {} dBm", frequency_mhz, tx_power_dbm);
        self.online = true;
        true
    }

    /// Offers a frame for transmission without waiting
    pub fn try_submit(&mut self, frame: &[u8]) -> SubmitOutcome {
        if !self.online {
            self.rejected = self.rejected.saturating_add(1);
            return SubmitOutcome::Rejected(RejectReason::Offline);
        }

        let mode = self.refresh();

        if self.state == LinkState::Transmitting || mode != RadioMode::Idle {
            self.rejected = self.rejected.saturating_add(1);
            debug!("Radio busy ({:?}), dropping frame", mode);
            return SubmitOutcome::Rejected(RejectReason::Busy);
        }

        self.driver.send(frame);
        self.state = LinkState::Transmitting;
        self.accepted = self.accepted.saturating_add(1);
        debug!("Started telemetry transmission ({} bytes)", frame.len());
        SubmitOutcome::Accepted
    }

    /// Current link state, refreshed from the hardware
    pub fn link_state(&mut self) -> LinkState {
        if self.online {
            self.refresh();
        }
        self.state
    }

    /// Whether the radio came up at startup
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Packets the hardware reports as sent
    pub fn sent_packet_count(&self) -> u16 {
        if self.online {
            self.driver.sent_packet_count()
        } else {
            0
        }
    }

    /// Frames accepted for transmission
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Frames dropped because the link was busy or offline
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Moves Transmitting → Idle once the hardware leaves TX mode
    fn refresh(&mut self) -> RadioMode {
        let mode = self.driver.current_mode();
        if self.state == LinkState::Transmitting && mode != RadioMode::Transmitting {
            self.state = LinkState::Idle;
            debug!("Telemetry transmission complete");
        }
        mode
    }
}
