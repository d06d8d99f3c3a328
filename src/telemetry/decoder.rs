//! # Telemetry Frame Decoder
//!
//! Ground-station side of the frame format. Also used by the JSON Lines
//! storage format to turn logged frames into readable records.

use bytes::Buf;

use super::protocol::*;
use crate::error::{FlightError, Result};
use crate::sensors::GpsFix;

/// Decode a complete telemetry frame
///
/// # Arguments
///
/// * `frame` - Exactly `TELEMETRY_FRAME_SIZE` bytes
///
/// # Returns
///
/// * `Result<TelemetryRecord>` - Decoded record, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Frame length is not `TELEMETRY_FRAME_SIZE`
/// - Reserved status bits are set
pub fn decode_frame(frame: &[u8]) -> Result<TelemetryRecord> {
    if frame.len() != TELEMETRY_FRAME_SIZE {
        return Err(FlightError::Decoding(format!(
            "Frame must be {} bytes, got {}",
            TELEMETRY_FRAME_SIZE,
            frame.len()
        )));
    }

    let mut buf = frame;

    let uptime_ms = buf.get_u32();
    let status_byte = buf.get_u8();
    if status_byte & STATUS_RESERVED_MASK != 0 {
        return Err(FlightError::Decoding(format!(
            "Reserved status bits set: 0x{:02X}",
            status_byte
        )));
    }

    let altimeter_hpa = buf.get_f32();

    let gps = GpsFix {
        hour: buf.get_u8(),
        minute: buf.get_u8(),
        second: buf.get_u8(),
        latitude: buf.get_f32(),
        longitude: buf.get_f32(),
        altitude_m: buf.get_f32(),
        speed_knots: buf.get_f32(),
        satellites: buf.get_u8(),
    };

    let tx_packets = buf.get_u16();

    Ok(TelemetryRecord {
        uptime_ms,
        status: StatusFlags::from_byte(status_byte),
        altimeter_hpa,
        gps,
        tx_packets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{SensorHealth, Snapshot};
    use crate::telemetry::encoder::TelemetryEncoder;

    #[test]
    fn test_decode_frame_wrong_length() {
        assert!(decode_frame(&[0u8; TELEMETRY_FRAME_SIZE - 1]).is_err());
        assert!(decode_frame(&[0u8; TELEMETRY_FRAME_SIZE + 1]).is_err());
        assert!(decode_frame(&[]).is_err());
    }

    #[test]
    fn test_decode_frame_reserved_bits() {
        let mut frame = [0u8; TELEMETRY_FRAME_SIZE];
        frame[4] = 0b0010_0000;

        match decode_frame(&frame) {
            Err(FlightError::Decoding(msg)) => assert!(msg.contains("Reserved")),
            other => panic!("Expected Decoding error, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_handcrafted_frame() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&35_000u32.to_be_bytes());
        frame.push(STATUS_STORAGE_OK | STATUS_LOW_BATTERY);
        frame.extend_from_slice(&987.25f32.to_be_bytes());
        frame.extend_from_slice(&[0u8; GPS_BLOCK_SIZE]);
        frame.extend_from_slice(&7u16.to_be_bytes());

        let record = decode_frame(&frame).unwrap();
        assert_eq!(record.uptime_ms, 35_000);
        assert!(record.status.storage_ok);
        assert!(record.status.low_battery);
        assert!(!record.status.gps_fix);
        assert_eq!(record.altimeter_hpa, 987.25);
        assert_eq!(record.fix(), None);
        assert_eq!(record.tx_packets, 7);
    }

    #[test]
    fn test_decode_encoder_output() {
        let fix = GpsFix {
            hour: 9,
            minute: 30,
            second: 0,
            latitude: -33.8568,
            longitude: 151.2153,
            altitude_m: 320.0,
            speed_knots: 12.5,
            satellites: 6,
        };
        let snapshot = Snapshot {
            uptime_ms: 4200,
            altimeter_hpa: Some(975.5),
            gps: Some(fix),
            imu: None,
            link_quality: 41,
            health: SensorHealth {
                altimeter: true,
                gps: true,
                imu: true,
            },
        };

        let mut encoder = TelemetryEncoder::new();
        let frame = encoder.encode(&snapshot, SystemStatus::default()).unwrap();
        let record = decode_frame(frame).unwrap();

        assert_eq!(record.uptime_ms, 4200);
        assert_eq!(record.altimeter_hpa, 975.5);
        assert_eq!(record.fix(), Some(fix));
        assert_eq!(record.tx_packets, 41);
        assert!(!record.status.storage_ok);
    }
}
