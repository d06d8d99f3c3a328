//! # Sensors Module
//!
//! Capability traits for the GPS receiver, barometric altimeter and inertial
//! unit, plus the snapshot provider that folds them into one "current best
//! known values" call.
//!
//! This module handles:
//! - Per-sensor fault isolation (a failed read degrades only that sensor)
//! - GPS freshness (fix data only replaced by a freshly parsed sentence)
//! - Altimeter reads inside the critical section
//! - Battery voltage monitoring (`battery`)
//! - GPS receive buffering and the polling interrupt (`gps`)
//! - A host NMEA driver (`nmea`)

pub mod battery;
pub mod gps;
pub mod nmea;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Millis;
use crate::critical_section::CriticalSection;
use crate::error::Result;

/// Position solution reported by the GPS receiver
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GpsFix {
    /// UTC hour (0-23)
    pub hour: u8,

    /// UTC minute (0-59)
    pub minute: u8,

    /// UTC second (0-60, leap second allowed)
    pub second: u8,

    /// Latitude in degrees, south negative
    pub latitude: f32,

    /// Longitude in degrees, west negative
    pub longitude: f32,

    /// Altitude above mean sea level in meters
    pub altitude_m: f32,

    /// Ground speed in knots
    pub speed_knots: f32,

    /// Satellites in use
    pub satellites: u8,
}

impl GpsFix {
    /// Whether every field is finite and inside its physical range
    pub fn is_plausible(&self) -> bool {
        let finite = [
            self.latitude,
            self.longitude,
            self.altitude_m,
            self.speed_knots,
        ]
        .iter()
        .all(|value| value.is_finite());

        finite
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.hour < 24
            && self.minute < 60
            && self.second <= 60
    }
}

/// One inertial measurement
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ImuSample {
    /// Acceleration in m/s²
    pub accel: [f32; 3],

    /// Angular rate in deg/s
    pub gyro: [f32; 3],

    /// Magnetic field in gauss
    pub mag: [f32; 3],
}

/// Per-sensor health flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SensorHealth {
    pub altimeter: bool,
    pub gps: bool,
    pub imu: bool,
}

/// Sensor state for one telemetry cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Milliseconds since start
    pub uptime_ms: Millis,

    /// Barometric pressure in hectopascals, if ever read
    pub altimeter_hpa: Option<f32>,

    /// Current fix, if the receiver reports one
    pub gps: Option<GpsFix>,

    /// Latest inertial sample, if the last read succeeded
    pub imu: Option<ImuSample>,

    /// Radio sent-packet counter
    pub link_quality: u16,

    pub health: SensorHealth,
}

impl Snapshot {
    /// Whether the GPS block holds a current fix
    pub fn has_fix(&self) -> bool {
        self.gps.is_some()
    }
}

/// GPS receiver capability
#[cfg_attr(test, mockall::automock)]
pub trait GpsDriver {
    /// Prepares the receiver; `false` if it is unusable
    fn init(&mut self) -> bool;

    /// Whether a complete sentence arrived since the last `take_sentence`
    fn has_new_sentence(&self) -> bool;

    /// Takes the most recent complete sentence
    fn take_sentence(&mut self) -> Option<String>;

    /// Parses a sentence into the receiver state; `false` on failure
    fn parse(&mut self, sentence: &str) -> bool;

    /// Whether the receiver currently has a position solution
    fn has_fix(&self) -> bool;

    /// Current parsed fix data
    fn read(&self) -> Result<GpsFix>;
}

/// Barometric altimeter capability
#[cfg_attr(test, mockall::automock)]
pub trait AltimeterDriver {
    /// Prepares the sensor; `false` if it is unusable
    fn init(&mut self) -> bool;

    /// Reads barometric pressure in pascals
    fn read(&mut self) -> Result<f32>;
}

/// Inertial measurement unit capability
#[cfg_attr(test, mockall::automock)]
pub trait ImuDriver {
    /// Prepares the sensor; `false` if it is unusable
    fn init(&mut self) -> bool;

    /// Reads one sample
    fn read(&mut self) -> Result<ImuSample>;
}

/// Result of initialising the sensor suite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorInitReport {
    pub gps: bool,
    pub altimeter: bool,
    pub imu: bool,
}

/// Snapshot provider over the GPS, altimeter and IMU
pub struct SensorSuite {
    gps: Box<dyn GpsDriver + Send>,
    altimeter: Box<dyn AltimeterDriver + Send>,
    imu: Box<dyn ImuDriver + Send>,
    critical: CriticalSection,

    gps_ready: bool,
    altimeter_ready: bool,
    imu_ready: bool,

    gps_ok: bool,
    gps_fix: Option<GpsFix>,
    altimeter_ok: bool,
    pressure_hpa: Option<f32>,
    imu_ok: bool,
    imu_sample: Option<ImuSample>,
}

impl SensorSuite {
    pub fn new(
        gps: Box<dyn GpsDriver + Send>,
        altimeter: Box<dyn AltimeterDriver + Send>,
        imu: Box<dyn ImuDriver + Send>,
        critical: CriticalSection,
    ) -> Self {
        Self {
            gps,
            altimeter,
            imu,
            critical,
            gps_ready: false,
            altimeter_ready: false,
            imu_ready: false,
            gps_ok: false,
            gps_fix: None,
            altimeter_ok: false,
            pressure_hpa: None,
            imu_ok: false,
            imu_sample: None,
        }
    }

    /// Initialises each sensor once
    ///
    /// A sensor that fails here is never read; its health flag stays false.
    pub fn init(&mut self) -> SensorInitReport {
        self.gps_ready = self.gps.init();
        self.altimeter_ready = self.altimeter.init();
        self.imu_ready = self.imu.init();

        let report = SensorInitReport {
            gps: self.gps_ready,
            altimeter: self.altimeter_ready,
            imu: self.imu_ready,
        };

        for (name, ok) in [
            ("GPS", report.gps),
            ("altimeter", report.altimeter),
            ("IMU", report.imu),
        ] {
            if ok {
                info!("{} initialised", name);
            } else {
                warn!("{} failed to initialise, continuing without it", name);
            }
        }

        report
    }

    /// Produces the snapshot for this cycle
    ///
    /// # Arguments
    ///
    /// * `uptime_ms` - Time of the pass that triggered the cycle
    /// * `link_quality` - Radio sent-packet counter
    pub fn sample(&mut self, uptime_ms: Millis, link_quality: u16) -> Snapshot {
        if self.gps_ready {
            self.poll_gps();
        }

        if self.altimeter_ready {
            self.read_altimeter();
        }

        if self.imu_ready {
            match self.imu.read() {
                Ok(sample) => {
                    self.imu_ok = true;
                    self.imu_sample = Some(sample);
                }
                Err(e) => {
                    debug!("IMU read failed: {}", e);
                    self.imu_ok = false;
                    self.imu_sample = None;
                }
            }
        }

        Snapshot {
            uptime_ms,
            altimeter_hpa: self.pressure_hpa,
            gps: self.gps_fix,
            imu: self.imu_sample,
            link_quality,
            health: SensorHealth {
                altimeter: self.altimeter_ok,
                gps: self.gps_ok,
                imu: self.imu_ok,
            },
        }
    }

    /// Consumes a new position sentence if one arrived
    ///
    /// Without a new sentence nothing changes. A failed parse or an
    /// implausible fix clears the health flag but keeps the previous fix; a
    /// fix the receiver reports but cannot deliver is dropped.
    fn poll_gps(&mut self) {
        if !self.gps.has_new_sentence() {
            return;
        }

        let Some(sentence) = self.gps.take_sentence() else {
            return;
        };

        if !gps::is_position_sentence(&sentence) {
            return;
        }

        self.gps_ok = self.gps.parse(&sentence);
        if !self.gps_ok {
            debug!("GPS parse failed: {}", sentence.trim_end());
            return;
        }

        if !self.gps.has_fix() {
            self.gps_fix = None;
            return;
        }

        match self.gps.read() {
            Ok(fix) if fix.is_plausible() => {
                debug!(
                    "GPS fix: {:.4}, {:.4} alt {:.1} m, {} sats",
                    fix.latitude, fix.longitude, fix.altitude_m, fix.satellites
                );
                self.gps_fix = Some(fix);
            }
            Ok(fix) => {
                warn!("Implausible GPS fix ignored: {:?}", fix);
                self.gps_ok = false;
            }
            Err(e) => {
                debug!("GPS fix unreadable: {}", e);
                self.gps_ok = false;
                self.gps_fix = None;
            }
        }
    }

    fn read_altimeter(&mut self) {
        let altimeter = &mut self.altimeter;
        let reading = self.critical.with(|| altimeter.read());

        match reading {
            Ok(pascals) => {
                self.altimeter_ok = true;
                self.pressure_hpa = Some(pascals / 100.0);
            }
            Err(e) => {
                debug!("Altimeter read failed, reusing last pressure: {}", e);
                self.altimeter_ok = false;
            }
        }
    }
}
