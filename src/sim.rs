//! # Simulated Devices
//!
//! Deterministic stand-ins for every device the loop drives. The binary uses
//! them when no hardware port is configured; tests use them to inject faults.
//!
//! Every device is `Clone` and clones share state, so a caller can keep a
//! handle after boxing the device into [`Devices`](crate::scheduler::Devices).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::{elapsed_ms, Clock, Millis};
use crate::error::{FlightError, Result};
use crate::indicator::StatusIndicator;
use crate::radio::{RadioDriver, RadioMode};
use crate::scheduler::gate::ElapsedGate;
use crate::sensors::battery::BatteryAdc;
use crate::sensors::gps::ByteSource;
use crate::sensors::nmea::format_sentence;
use crate::sensors::{AltimeterDriver, ImuDriver, ImuSample};
use crate::storage::StorageDriver;

/// Sea-level standard pressure in pascals
pub const STANDARD_PRESSURE_PA: f32 = 101_325.0;

/// Simulated radio airtime for one frame
pub const DEFAULT_SIM_AIRTIME_MS: Millis = 60;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared on/off switch used for fault injection
#[derive(Debug, Clone, Default)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    pub fn new(on: bool) -> Self {
        Self(Arc::new(AtomicBool::new(on)))
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::Relaxed);
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Barometer reading a fixed pressure
#[derive(Debug, Clone)]
pub struct SimAltimeter {
    pressure_pa: f32,
    present: bool,
    pub fault: Switch,
}

impl SimAltimeter {
    pub fn new(pressure_pa: f32) -> Self {
        Self {
            pressure_pa,
            present: true,
            fault: Switch::default(),
        }
    }

    /// Altimeter that fails to initialise
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(STANDARD_PRESSURE_PA)
        }
    }
}

impl AltimeterDriver for SimAltimeter {
    fn init(&mut self) -> bool {
        self.present
    }

    fn read(&mut self) -> Result<f32> {
        if self.fault.is_on() {
            return Err(FlightError::Sensor("simulated altimeter fault".to_string()));
        }
        Ok(self.pressure_pa)
    }
}

/// IMU at rest, level
#[derive(Debug, Clone)]
pub struct SimImu {
    present: bool,
    pub fault: Switch,
}

impl SimImu {
    pub fn new() -> Self {
        Self {
            present: true,
            fault: Switch::default(),
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            fault: Switch::default(),
        }
    }
}

impl Default for SimImu {
    fn default() -> Self {
        Self::new()
    }
}

impl ImuDriver for SimImu {
    fn init(&mut self) -> bool {
        self.present
    }

    fn read(&mut self) -> Result<ImuSample> {
        if self.fault.is_on() {
            return Err(FlightError::Sensor("simulated IMU fault".to_string()));
        }
        Ok(ImuSample {
            accel: [0.0, 0.0, 9.81],
            gyro: [0.0; 3],
            mag: [0.2, 0.0, 0.4],
        })
    }
}

/// Battery ADC with a settable raw count
#[derive(Debug, Clone)]
pub struct SimBattery {
    raw: Arc<AtomicU16>,
    pub fault: Switch,
}

impl SimBattery {
    pub fn new(raw: u16) -> Self {
        Self {
            raw: Arc::new(AtomicU16::new(raw)),
            fault: Switch::default(),
        }
    }

    pub fn set_raw(&self, raw: u16) {
        self.raw.store(raw, Ordering::Relaxed);
    }
}

impl BatteryAdc for SimBattery {
    fn read_raw(&mut self) -> Result<u16> {
        if self.fault.is_on() {
            return Err(FlightError::Sensor("simulated ADC fault".to_string()));
        }
        Ok(self.raw.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct SimRadioState {
    tx_started: Option<Millis>,
    sent: Vec<Vec<u8>>,
    completed: u16,
    receiving: bool,
    frequency_mhz: Option<f32>,
    power_dbm: Option<i8>,
}

/// Radio whose transmissions take a fixed airtime on a shared clock
#[derive(Debug, Clone)]
pub struct SimRadio<C> {
    clock: C,
    airtime_ms: Millis,
    present: bool,
    state: Arc<Mutex<SimRadioState>>,
}

impl<C: Clock> SimRadio<C> {
    pub fn new(clock: C, airtime_ms: Millis) -> Self {
        Self {
            clock,
            airtime_ms,
            present: true,
            state: Arc::new(Mutex::new(SimRadioState::default())),
        }
    }

    /// Radio that fails to initialise
    pub fn absent(clock: C) -> Self {
        Self {
            present: false,
            ..Self::new(clock, DEFAULT_SIM_AIRTIME_MS)
        }
    }

    /// Holds the radio in receive mode
    pub fn set_receiving(&self, receiving: bool) {
        lock(&self.state).receiving = receiving;
    }

    /// Every frame handed to `send`, oldest first
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent.clone()
    }

    pub fn frequency_mhz(&self) -> Option<f32> {
        lock(&self.state).frequency_mhz
    }

    pub fn power_dbm(&self) -> Option<i8> {
        lock(&self.state).power_dbm
    }

    /// Completes the in-flight frame once its airtime has passed
    fn settle(&self, state: &mut SimRadioState) {
        if let Some(started) = state.tx_started {
            if elapsed_ms(self.clock.now_ms(), started) >= self.airtime_ms {
                state.tx_started = None;
                state.completed = state.completed.wrapping_add(1);
            }
        }
    }
}

impl<C: Clock> RadioDriver for SimRadio<C> {
    fn init(&mut self) -> bool {
        self.present
    }

    fn set_frequency(&mut self, mhz: f32) -> bool {
        lock(&self.state).frequency_mhz = Some(mhz);
        true
    }

    fn set_power(&mut self, dbm: i8) {
        lock(&self.state).power_dbm = Some(dbm);
    }

    fn current_mode(&self) -> RadioMode {
        let mut state = lock(&self.state);
        self.settle(&mut state);

        if state.tx_started.is_some() {
            RadioMode::Transmitting
        } else if state.receiving {
            RadioMode::Receiving
        } else {
            RadioMode::Idle
        }
    }

    fn send(&mut self, frame: &[u8]) {
        let mut state = lock(&self.state);
        state.sent.push(frame.to_vec());
        state.tx_started = Some(self.clock.now_ms());
    }

    fn sent_packet_count(&self) -> u16 {
        let mut state = lock(&self.state);
        self.settle(&mut state);
        state.completed
    }
}

#[derive(Debug, Default)]
struct SimStorageState {
    records: Vec<Vec<u8>>,
}

/// In-memory storage with injectable init and append failures
#[derive(Debug, Clone, Default)]
pub struct SimStorage {
    present: bool,
    pub fault: Switch,
    state: Arc<Mutex<SimStorageState>>,
}

impl SimStorage {
    pub fn new() -> Self {
        Self {
            present: true,
            ..Self::default()
        }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Vec<u8>> {
        lock(&self.state).records.clone()
    }
}

impl StorageDriver for SimStorage {
    fn init(&mut self) -> bool {
        self.present
    }

    fn append(&mut self, bytes: &[u8]) -> bool {
        if self.fault.is_on() {
            return false;
        }
        lock(&self.state).records.push(bytes.to_vec());
        true
    }
}

/// Indicator whose state can be read back
#[derive(Debug, Clone, Default)]
pub struct SimIndicator {
    pub lit: Switch,
}

impl SimIndicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusIndicator for SimIndicator {
    fn set(&mut self, on: bool) {
        self.lit.set(on);
    }
}

/// GPS receiver byte stream replaying canned sentences once per period
///
/// Each sentence is released whole when its period elapses, then handed out
/// one byte per `read_byte`, as a UART would.
#[derive(Debug)]
pub struct ScriptedNmea<C> {
    clock: C,
    sentences: Vec<String>,
    period_ms: Millis,
    gate: ElapsedGate,
    next: usize,
    pending: VecDeque<u8>,
}

impl<C: Clock> ScriptedNmea<C> {
    pub fn new(clock: C, sentences: Vec<String>, period_ms: Millis) -> Self {
        let start = clock.now_ms();
        Self {
            clock,
            sentences,
            period_ms,
            gate: ElapsedGate::new(start),
            next: 0,
            pending: VecDeque::new(),
        }
    }

    /// Receiver holding a fix over a field, alternating GGA and RMC at 1 Hz
    pub fn hovering(clock: C) -> Self {
        let sentences = vec![
            format_sentence("GPGGA,120000.000,4916.450,N,12311.120,W,1,07,1.1,152.0,M,-17.0,M,,"),
            format_sentence("GPRMC,120000.000,A,4916.450,N,12311.120,W,003.2,054.7,170526,,,A"),
        ];
        Self::new(clock, sentences, 1000)
    }
}

impl<C: Clock> ByteSource for ScriptedNmea<C> {
    fn read_byte(&mut self) -> Option<u8> {
        if self.pending.is_empty()
            && !self.sentences.is_empty()
            && self.gate.fire_if_due(self.clock.now_ms(), self.period_ms)
        {
            let sentence = &self.sentences[self.next % self.sentences.len()];
            self.pending.extend(sentence.bytes());
            self.pending.extend(b"\r\n");
            self.next = self.next.wrapping_add(1);
        }

        self.pending.pop_front()
    }
}
