//! # Telemetry Module
//!
//! The fixed-layout telemetry frame shared with the ground station.
//!
//! This module handles:
//! - Frame layout and status bit definitions
//! - Encoding snapshots into frames (GPS block carried forward without a fix)
//! - Decoding frames into records for logs and ground tools

pub mod protocol;
pub mod encoder;
pub mod decoder;
