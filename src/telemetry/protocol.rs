//! # Telemetry Frame Constants and Types
//!
//! Fixed layout shared with the ground-station decoder. All multi-byte fields
//! are big-endian (network order); floats are IEEE-754 single precision.
//!
//! ```text
//! offset size field
//!      0    4 uptime ms (u32)
//!      4    1 status flags
//!      5    4 altimeter pressure hPa (f32)
//!      9    1 GPS hour
//!     10    1 GPS minute
//!     11    1 GPS second
//!     12    4 latitude degrees (f32)
//!     16    4 longitude degrees (f32)
//!     20    4 GPS altitude m (f32)
//!     24    4 ground speed knots (f32)
//!     28    1 satellites
//!     29    2 transmitted-packet counter (u16)
//! ```
//!
//! The GPS block (offsets 9..29) is only meaningful when the gps-fix bit is
//! set; otherwise it repeats whatever was last written.

use serde::Serialize;

use crate::sensors::GpsFix;

/// Total frame size in bytes
pub const TELEMETRY_FRAME_SIZE: usize = 31;

/// Offset of the GPS block
pub const GPS_BLOCK_OFFSET: usize = 9;

/// Size of the GPS block
pub const GPS_BLOCK_SIZE: usize = 20;

/// Offset of the transmitted-packet counter
pub const TX_COUNTER_OFFSET: usize = GPS_BLOCK_OFFSET + GPS_BLOCK_SIZE;

/// Status bit: altimeter read succeeded
pub const STATUS_ALTIMETER_OK: u8 = 1 << 0;

/// Status bit: last storage append succeeded
pub const STATUS_STORAGE_OK: u8 = 1 << 1;

/// Status bit: last GPS sentence parsed
pub const STATUS_GPS_OK: u8 = 1 << 2;

/// Status bit: GPS block holds a current fix
pub const STATUS_GPS_FIX: u8 = 1 << 3;

/// Status bit: battery below threshold
pub const STATUS_LOW_BATTERY: u8 = 1 << 4;

/// Bits that must be zero
pub const STATUS_RESERVED_MASK: u8 = 0b1110_0000;

/// Status bitfield carried in byte 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusFlags {
    pub altimeter_ok: bool,
    pub storage_ok: bool,
    pub gps_ok: bool,
    pub gps_fix: bool,
    pub low_battery: bool,
}

impl StatusFlags {
    /// Packs the flags into the status byte
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        for (set, bit) in [
            (self.altimeter_ok, STATUS_ALTIMETER_OK),
            (self.storage_ok, STATUS_STORAGE_OK),
            (self.gps_ok, STATUS_GPS_OK),
            (self.gps_fix, STATUS_GPS_FIX),
            (self.low_battery, STATUS_LOW_BATTERY),
        ] {
            if set {
                byte |= bit;
            }
        }
        byte
    }

    /// Unpacks the status byte; reserved bits are ignored
    pub fn from_byte(byte: u8) -> Self {
        Self {
            altimeter_ok: byte & STATUS_ALTIMETER_OK != 0,
            storage_ok: byte & STATUS_STORAGE_OK != 0,
            gps_ok: byte & STATUS_GPS_OK != 0,
            gps_fix: byte & STATUS_GPS_FIX != 0,
            low_battery: byte & STATUS_LOW_BATTERY != 0,
        }
    }
}

/// System-level status passed to the encoder alongside the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemStatus {
    /// Result of the previous storage append
    pub storage_ok: bool,

    /// Result of the last battery check
    pub low_battery: bool,
}

/// Decoded telemetry frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Milliseconds since start
    pub uptime_ms: u32,

    pub status: StatusFlags,

    /// Barometric pressure in hectopascals
    pub altimeter_hpa: f32,

    /// GPS block as transmitted; only trust it when `status.gps_fix` is set
    pub gps: GpsFix,

    /// Radio sent-packet counter
    pub tx_packets: u16,
}

impl TelemetryRecord {
    /// GPS data gated on the fix bit
    pub fn fix(&self) -> Option<GpsFix> {
        self.status.gps_fix.then_some(self.gps)
    }
}
