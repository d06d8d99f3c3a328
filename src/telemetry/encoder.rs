//! # Telemetry Frame Encoder
//!
//! Builds the fixed 31-byte frame from a sensor snapshot and system status.

use bytes::{BufMut, BytesMut};

use super::protocol::*;
use crate::error::{FlightError, Result};
use crate::sensors::{GpsFix, Snapshot};

/// Encoder with a reusable frame buffer and the last written GPS block
///
/// The slice returned by [`encode`](Self::encode) is valid until the next
/// call, which overwrites it.
///
/// # Examples
///
/// ```
/// use flight_telemetry::sensors::{SensorHealth, Snapshot};
/// use flight_telemetry::telemetry::encoder::TelemetryEncoder;
/// use flight_telemetry::telemetry::protocol::{SystemStatus, TELEMETRY_FRAME_SIZE};
///
/// let snapshot = Snapshot {
///     uptime_ms: 100,
///     altimeter_hpa: Some(1013.25),
///     gps: None,
///     imu: None,
///     link_quality: 0,
///     health: SensorHealth::default(),
/// };
///
/// let mut encoder = TelemetryEncoder::new();
/// let frame = encoder.encode(&snapshot, SystemStatus::default()).unwrap();
/// assert_eq!(frame.len(), TELEMETRY_FRAME_SIZE);
/// ```
#[derive(Debug, Clone)]
pub struct TelemetryEncoder {
    buffer: BytesMut,
    gps: GpsFix,
}

impl Default for TelemetryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryEncoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(TELEMETRY_FRAME_SIZE),
            gps: GpsFix::default(),
        }
    }

    /// Encode a snapshot into a complete frame
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Sensor state for this cycle
    /// * `status` - Storage and battery flags
    ///
    /// # Returns
    ///
    /// * `Result<&[u8]>` - The full frame
    ///
    /// # Errors
    ///
    /// Returns `FlightError::Encoding` if a value cannot be represented in
    /// the frame. Nothing is written in that case and the retained GPS block
    /// is left as it was.
    pub fn encode(&mut self, snapshot: &Snapshot, status: SystemStatus) -> Result<&[u8]> {
        let altimeter_hpa = snapshot.altimeter_hpa.unwrap_or(0.0);
        check_finite("altimeter", altimeter_hpa)?;

        if let Some(fix) = &snapshot.gps {
            validate_fix(fix)?;
            self.gps = *fix;
        }

        let flags = StatusFlags {
            altimeter_ok: snapshot.health.altimeter,
            storage_ok: status.storage_ok,
            gps_ok: snapshot.health.gps,
            gps_fix: snapshot.has_fix(),
            low_battery: status.low_battery,
        };

        self.buffer.clear();
        self.buffer.put_u32(snapshot.uptime_ms);
        self.buffer.put_u8(flags.to_byte());
        self.buffer.put_f32(altimeter_hpa);
        put_gps_block(&mut self.buffer, &self.gps);
        self.buffer.put_u16(snapshot.link_quality);

        debug_assert_eq!(self.buffer.len(), TELEMETRY_FRAME_SIZE);
        Ok(&self.buffer[..])
    }

    /// GPS block that the next frame without a fix will repeat
    pub fn retained_gps(&self) -> &GpsFix {
        &self.gps
    }
}

fn put_gps_block(buffer: &mut BytesMut, fix: &GpsFix) {
    buffer.put_u8(fix.hour);
    buffer.put_u8(fix.minute);
    buffer.put_u8(fix.second);
    buffer.put_f32(fix.latitude);
    buffer.put_f32(fix.longitude);
    buffer.put_f32(fix.altitude_m);
    buffer.put_f32(fix.speed_knots);
    buffer.put_u8(fix.satellites);
}

fn check_finite(field: &str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FlightError::Encoding(format!("{} is not finite: {}", field, value)))
    }
}

fn validate_fix(fix: &GpsFix) -> Result<()> {
    check_finite("latitude", fix.latitude)?;
    check_finite("longitude", fix.longitude)?;
    check_finite("GPS altitude", fix.altitude_m)?;
    check_finite("speed", fix.speed_knots)?;

    if !(-90.0..=90.0).contains(&fix.latitude) {
        return Err(FlightError::Encoding(format!(
            "latitude {} out of range",
            fix.latitude
        )));
    }

    if !(-180.0..=180.0).contains(&fix.longitude) {
        return Err(FlightError::Encoding(format!(
            "longitude {} out of range",
            fix.longitude
        )));
    }

    if fix.hour > 23 || fix.minute > 59 || fix.second > 60 {
        return Err(FlightError::Encoding(format!(
            "GPS time {:02}:{:02}:{:02} out of range",
            fix.hour, fix.minute, fix.second
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorHealth;

    fn fix() -> GpsFix {
        GpsFix {
            hour: 14,
            minute: 5,
            second: 59,
            latitude: 43.6532,
            longitude: -79.3832,
            altitude_m: 1250.5,
            speed_knots: 48.0,
            satellites: 11,
        }
    }

    fn snapshot(uptime_ms: u32, gps: Option<GpsFix>) -> Snapshot {
        Snapshot {
            uptime_ms,
            altimeter_hpa: Some(1000.5),
            gps,
            imu: None,
            link_quality: 0x0102,
            health: SensorHealth {
                altimeter: true,
                gps: gps.is_some(),
                imu: false,
            },
        }
    }

    #[test]
    fn test_frame_length() {
        let mut encoder = TelemetryEncoder::new();
        let frame = encoder.encode(&snapshot(0, None), SystemStatus::default()).unwrap();
        assert_eq!(frame.len(), TELEMETRY_FRAME_SIZE);
    }

    #[test]
    fn test_frame_layout() {
        let mut encoder = TelemetryEncoder::new();
        let status = SystemStatus {
            storage_ok: true,
            low_battery: true,
        };
        let frame = encoder
            .encode(&snapshot(0x0A0B_0C0D, Some(fix())), status)
            .unwrap()
            .to_vec();

        assert_eq!(&frame[0..4], &[0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(
            frame[4],
            STATUS_ALTIMETER_OK
                | STATUS_STORAGE_OK
                | STATUS_GPS_OK
                | STATUS_GPS_FIX
                | STATUS_LOW_BATTERY
        );
        assert_eq!(&frame[5..9], &1000.5f32.to_be_bytes());
        assert_eq!(&frame[9..12], &[14, 5, 59]);
        assert_eq!(&frame[12..16], &43.6532f32.to_be_bytes());
        assert_eq!(&frame[16..20], &(-79.3832f32).to_be_bytes());
        assert_eq!(&frame[20..24], &1250.5f32.to_be_bytes());
        assert_eq!(&frame[24..28], &48.0f32.to_be_bytes());
        assert_eq!(frame[28], 11);
        assert_eq!(&frame[29..31], &[0x01, 0x02]);
    }

    #[test]
    fn test_missing_altimeter_encodes_zero() {
        let mut encoder = TelemetryEncoder::new();
        let mut snap = snapshot(0, None);
        snap.altimeter_hpa = None;
        snap.health.altimeter = false;

        let frame = encoder.encode(&snap, SystemStatus::default()).unwrap();
        assert_eq!(&frame[5..9], &0.0f32.to_be_bytes());
        assert_eq!(frame[4] & STATUS_ALTIMETER_OK, 0);
    }

    #[test]
    fn test_no_fix_repeats_previous_gps_block() {
        let mut encoder = TelemetryEncoder::new();

        let first = encoder
            .encode(&snapshot(100, Some(fix())), SystemStatus::default())
            .unwrap()
            .to_vec();
        let second = encoder
            .encode(&snapshot(200, None), SystemStatus::default())
            .unwrap()
            .to_vec();

        assert_eq!(second[4] & STATUS_GPS_FIX, 0);
        assert_eq!(
            &second[GPS_BLOCK_OFFSET..TX_COUNTER_OFFSET],
            &first[GPS_BLOCK_OFFSET..TX_COUNTER_OFFSET]
        );
        assert_ne!(&second[GPS_BLOCK_OFFSET..TX_COUNTER_OFFSET], &[0u8; GPS_BLOCK_SIZE]);
    }

    #[test]
    fn test_no_fix_ever_gives_zero_block() {
        let mut encoder = TelemetryEncoder::new();
        let frame = encoder.encode(&snapshot(0, None), SystemStatus::default()).unwrap();
        assert_eq!(&frame[GPS_BLOCK_OFFSET..TX_COUNTER_OFFSET], &[0u8; GPS_BLOCK_SIZE]);
    }

    #[test]
    fn test_non_finite_altimeter_fails() {
        let mut encoder = TelemetryEncoder::new();
        let mut snap = snapshot(0, None);
        snap.altimeter_hpa = Some(f32::NAN);

        let result = encoder.encode(&snap, SystemStatus::default());
        assert!(matches!(result, Err(FlightError::Encoding(_))));
    }

    #[test]
    fn test_out_of_range_fix_fails_and_keeps_retained_block() {
        let mut encoder = TelemetryEncoder::new();
        encoder
            .encode(&snapshot(100, Some(fix())), SystemStatus::default())
            .unwrap();

        let mut bad = fix();
        bad.latitude = 91.0;
        assert!(encoder
            .encode(&snapshot(200, Some(bad)), SystemStatus::default())
            .is_err());
        assert_eq!(*encoder.retained_gps(), fix());

        let mut bad_time = fix();
        bad_time.hour = 24;
        assert!(encoder
            .encode(&snapshot(300, Some(bad_time)), SystemStatus::default())
            .is_err());

        let mut bad_lon = fix();
        bad_lon.longitude = f32::INFINITY;
        assert!(encoder
            .encode(&snapshot(400, Some(bad_lon)), SystemStatus::default())
            .is_err());
        assert_eq!(*encoder.retained_gps(), fix());
    }

    #[test]
    fn test_deterministic() {
        let mut a = TelemetryEncoder::new();
        let mut b = TelemetryEncoder::new();
        let snap = snapshot(1234, Some(fix()));

        let frame_a = a.encode(&snap, SystemStatus::default()).unwrap().to_vec();
        let frame_b = b.encode(&snap, SystemStatus::default()).unwrap().to_vec();
        assert_eq!(frame_a, frame_b);
    }
}
