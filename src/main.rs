//! # Flight Telemetry
//!
//! Runs the cooperative telemetry loop on a host.
//!
//! Serial ports configured under `[radio]` and `[gps]` drive a real modem and
//! receiver; an empty port runs that link against a simulated device. The
//! barometer, IMU and battery ADC are always simulated on a host.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use flight_telemetry::clock::SystemClock;
use flight_telemetry::config::Config;
use flight_telemetry::critical_section::CriticalSection;
use flight_telemetry::indicator::LogIndicator;
use flight_telemetry::radio::serial::{open_port, SerialRadio};
use flight_telemetry::radio::RadioDriver;
use flight_telemetry::scheduler::{Devices, Scheduler};
use flight_telemetry::sensors::gps::{spawn_gps_interrupt, GpsRxBuffer};
use flight_telemetry::sensors::nmea::NmeaGps;
use flight_telemetry::sim::{
    ScriptedNmea, SimAltimeter, SimBattery, SimImu, SimRadio, SimStorage, STANDARD_PRESSURE_PA,
};
use flight_telemetry::storage::file::FileStorage;
use flight_telemetry::storage::StorageDriver;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Telemetry cycles between status log messages
const LOG_INTERVAL_CYCLES: u64 = 100;

/// Bytes the GPS receive FIFO holds before dropping
const GPS_FIFO_DEPTH: usize = 1024;

/// Simulated battery reading: ~4.0 V with the default divider
const SIM_BATTERY_RAW: u16 = 621;

/// Main entry point for the flight telemetry loop
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (argument, `config/default.toml`, or defaults)
///    - Set up logging with tracing subscriber
///    - Build devices and start the GPS interrupt
///    - Initialise every device once; optionally halt if the radio is down
///
/// 2. **Main Loop**
///    - Run one scheduler pass every `loop_interval_ms`
///    - Log loop statistics periodically
///
/// 3. **Shutdown**
///    - Ctrl+C stops the loop and logs final statistics
#[tokio::main]
async fn main() -> Result<()> {
    let config_arg = std::env::args().nth(1);
    let config = load_config(config_arg.as_deref())?;

    let _log_guard = init_logging(&config);

    info!("Flight telemetry v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let clock = SystemClock::new();
    let critical = CriticalSection::new();
    let rx = GpsRxBuffer::new();

    let _gps_tasks = start_gps(&config, clock, rx.clone(), critical.clone());

    let devices = build_devices(&config, clock, rx);
    let mut scheduler = Scheduler::new(clock, devices, config.scheduler_config(), critical);

    let startup = scheduler.start();
    if !startup.radio && config.radio.halt_on_init_failure {
        error!("Radio failed to initialise and halt_on_init_failure is set");
        bail!("radio failed to initialise");
    }

    let mut ticker = interval(Duration::from_millis(config.timing.loop_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Running: telemetry every {} ms, battery every {} ms",
        config.timing.telemetry_period_ms, config.timing.battery_period_ms
    );
    info!("Press Ctrl+C to exit");

    let mut last_log_cycles: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = scheduler.run_pass();

                if let Some(volts) = report.battery_volts {
                    info!(
                        "Battery {:.2} V{}",
                        volts,
                        if scheduler.battery_low() { " (LOW)" } else { "" }
                    );
                }

                let stats = scheduler.stats();
                if stats.cycles - last_log_cycles >= LOG_INTERVAL_CYCLES {
                    info!(
                        "{} cycles: {} sent, {} dropped, {} encode failures, {} log failures",
                        stats.cycles,
                        stats.frames_sent,
                        stats.frames_dropped,
                        stats.encode_failures,
                        stats.log_failures
                    );
                    last_log_cycles = stats.cycles;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Final statistics: {:?}", scheduler.stats());
                break;
            }
        }
    }

    Ok(())
}

/// Loads the configuration named on the command line, else the default file,
/// else built-in defaults
fn load_config(arg: Option<&str>) -> Result<Config> {
    match arg {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load config from {}", path))
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Console logging, plus a daily log file next to the frame logs
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let console = tracing_subscriber::fmt::layer();

    if config.storage.enabled {
        let appender =
            tracing_appender::rolling::daily(&config.storage.log_dir, "flight-telemetry.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .with(file)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .init();
        None
    }
}

/// Starts the GPS receive path: serial reader (if a port is set) and the
/// polling interrupt
fn start_gps(
    config: &Config,
    clock: SystemClock,
    rx: GpsRxBuffer,
    critical: CriticalSection,
) -> Vec<JoinHandle<()>> {
    let hz = config.timing.gps_poll_hz;

    if config.gps.port.is_empty() {
        info!("No GPS port configured, using simulated receiver");
        let source = ScriptedNmea::hovering(clock);
        return vec![spawn_gps_interrupt(source, rx, critical, hz)];
    }

    match open_port(&config.gps.port, config.gps.baud_rate) {
        Ok(port) => {
            info!("Opened GPS receiver at {}", config.gps.port);
            let (tx, fifo) = mpsc::channel(GPS_FIFO_DEPTH);
            vec![
                spawn_gps_reader(port, tx),
                spawn_gps_interrupt(fifo, rx, critical, hz),
            ]
        }
        Err(e) => {
            warn!("GPS unavailable, running without position: {}", e);
            Vec::new()
        }
    }
}

/// Moves bytes from the GPS serial port into the receive FIFO
///
/// A full FIFO drops bytes the way a UART overrun would.
fn spawn_gps_reader(mut port: tokio_serial::SerialStream, tx: mpsc::Sender<u8>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        loop {
            match port.read(&mut buf).await {
                Ok(0) => {
                    warn!("GPS port closed");
                    break;
                }
                Ok(n) => {
                    for &byte in &buf[..n] {
                        if tx.try_send(byte).is_err() {
                            debug!("GPS receive FIFO full, byte dropped");
                        }
                    }
                }
                Err(e) => {
                    warn!("GPS read failed: {}", e);
                    break;
                }
            }
        }
    })
}

fn build_devices(config: &Config, clock: SystemClock, rx: GpsRxBuffer) -> Devices {
    let radio: Box<dyn RadioDriver + Send> = if config.radio.port.is_empty() {
        info!(
            "No radio port configured, using simulated radio ({} ms airtime)",
            config.radio.sim_airtime_ms
        );
        Box::new(SimRadio::new(clock, config.radio.sim_airtime_ms))
    } else {
        Box::new(SerialRadio::new(config.radio.port.clone(), config.radio.baud_rate))
    };

    let storage: Box<dyn StorageDriver + Send> = if config.storage.enabled {
        Box::new(FileStorage::new(
            &config.storage.log_dir,
            config.storage.format,
            config.storage.max_records_per_file,
            config.storage.max_files_to_keep,
        ))
    } else {
        info!("Frame logging disabled");
        Box::new(SimStorage::absent())
    };

    Devices {
        gps: Box::new(NmeaGps::new(rx)),
        altimeter: Box::new(SimAltimeter::new(STANDARD_PRESSURE_PA)),
        imu: Box::new(SimImu::new()),
        battery: Box::new(SimBattery::new(SIM_BATTERY_RAW)),
        radio,
        storage,
        indicator: Box::new(LogIndicator::new()),
    }
}
