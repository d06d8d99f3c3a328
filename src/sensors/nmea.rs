//! # NMEA GPS Driver
//!
//! Host implementation of [`GpsDriver`] over a [`GpsRxBuffer`]. Sentences are
//! decoded with `nmea0183`; only GGA (fix data, altitude, satellites) and RMC
//! (recommended minimum, speed) are applied. A sentence is applied whole or
//! not at all: a bad checksum, a malformed field or an implausible value
//! leaves the previous state untouched.

use nmea0183::{GPSQuality, ParseResult, Parser, GGA, RMC};
use tracing::debug;

use super::gps::GpsRxBuffer;
use super::{GpsDriver, GpsFix};
use crate::error::{FlightError, Result};

/// GPS receiver speaking NMEA 0183
#[derive(Debug, Clone, Default)]
pub struct NmeaGps {
    rx: GpsRxBuffer,
    fix: bool,
    data: GpsFix,
}

impl NmeaGps {
    pub fn new(rx: GpsRxBuffer) -> Self {
        Self {
            rx,
            fix: false,
            data: GpsFix::default(),
        }
    }

    fn apply_gga(&mut self, gga: Option<&GGA>) -> bool {
        let Some(gga) = gga else {
            self.fix = false;
            return true;
        };

        self.data.hour = gga.time.hours;
        self.data.minute = gga.time.minutes;
        self.data.second = gga.time.seconds as u8;
        self.data.satellites = gga.sat_in_use;

        if matches!(gga.gps_quality, GPSQuality::NoFix) {
            self.fix = false;
            return true;
        }

        let altitude = &gga.altitude;

        self.fix = true;
        self.data.latitude = gga.latitude.as_f64() as f32;
        self.data.longitude = gga.longitude.as_f64() as f32;
        self.data.altitude_m = altitude.meters;
        true
    }

    fn apply_rmc(&mut self, rmc: Option<&RMC>) -> bool {
        // RMC with status V decodes to None
        let Some(rmc) = rmc else {
            self.fix = false;
            return true;
        };

        let time = &rmc.datetime.time;
        self.fix = true;
        self.data.hour = time.hours;
        self.data.minute = time.minutes;
        self.data.second = time.seconds as u8;
        self.data.latitude = rmc.latitude.as_f64() as f32;
        self.data.longitude = rmc.longitude.as_f64() as f32;
        self.data.speed_knots = rmc.speed.as_knots();
        true
    }
}

impl GpsDriver for NmeaGps {
    fn init(&mut self) -> bool {
        true
    }

    fn has_new_sentence(&self) -> bool {
        self.rx.has_new_sentence()
    }

    fn take_sentence(&mut self) -> Option<String> {
        self.rx.take_sentence()
    }

    fn parse(&mut self, sentence: &str) -> bool {
        let sentence = sentence.trim();
        if has_overflowing_minutes(sentence) {
            debug!("NMEA coordinate minutes out of range: {}", sentence);
            return false;
        }

        let mut parser = Parser::new();
        let mut parsed = None;
        for &byte in sentence.as_bytes().iter().chain(b"\r\n") {
            if let Some(result) = parser.parse_from_byte(byte) {
                parsed = Some(result);
            }
        }

        // Work on a copy so a rejected sentence leaves no trace
        let mut next = self.clone();
        let applied = match parsed {
            Some(Ok(ParseResult::GGA(gga))) => next.apply_gga(gga.as_ref()),
            Some(Ok(ParseResult::RMC(rmc))) => next.apply_rmc(rmc.as_ref()),
            Some(Ok(_)) | None => false,
            Some(Err(e)) => {
                debug!("NMEA sentence rejected: {}", e);
                false
            }
        };

        if !applied || (next.fix && !next.data.is_plausible()) {
            return false;
        }

        self.fix = next.fix;
        self.data = next.data;
        true
    }

    fn has_fix(&self) -> bool {
        self.fix
    }

    fn read(&self) -> Result<GpsFix> {
        if self.fix {
            Ok(self.data)
        } else {
            Err(FlightError::Sensor("GPS has no fix".to_string()))
        }
    }
}

/// XOR of every byte between `$` and `*`
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Wraps a sentence body as `$body*hh`
pub fn format_sentence(body: &str) -> String {
    format!("${}*{:02X}", body, checksum(body))
}

/// Whether a GGA or RMC coordinate carries 60 or more minutes
///
/// `nmea0183` folds such minutes into the next degree instead of rejecting
/// them.
fn has_overflowing_minutes(sentence: &str) -> bool {
    let fields: Vec<&str> = sentence.split(',').collect();
    let (latitude, longitude) = match fields.first().and_then(|address| address.get(3..6)) {
        Some("GGA") => (2, 4),
        Some("RMC") => (3, 5),
        _ => return false,
    };

    // ddmm.mmmm and dddmm.mmmm
    [(latitude, 2), (longitude, 3)].iter().any(|&(index, degree_digits)| {
        fields
            .get(index)
            .and_then(|field| field.get(degree_digits..))
            .and_then(|minutes| minutes.parse::<f64>().ok())
            .is_some_and(|minutes| minutes >= 60.0)
    })
}
