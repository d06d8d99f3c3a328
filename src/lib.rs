//! # Flight Telemetry Library
//!
//! Cooperative telemetry loop for a small airborne vehicle.
//!
//! On a single thread, a scheduler samples the sensors every 100 ms, encodes a
//! fixed 31-byte frame, logs it and offers it to a half-duplex radio without
//! ever waiting on the radio. A battery check runs every 35 s. The only
//! concurrent actor is the GPS receive interrupt.

pub mod clock;
pub mod config;
pub mod critical_section;
pub mod error;
pub mod indicator;
pub mod radio;
pub mod scheduler;
pub mod sensors;
pub mod sim;
pub mod storage;
pub mod telemetry;
