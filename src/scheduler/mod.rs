//! # Scheduler Module
//!
//! Cooperative, non-blocking main loop.
//!
//! This module handles:
//! - Elapsed-time gates and periodic task records (`gate`, `task`)
//! - Device startup and the status indicator
//! - One pass of the loop: read the clock once, run every due task in
//!   priority order
//! - The telemetry cycle: sample → encode → log → offer to the radio
//! - The battery cycle: sample voltage → recompute the low flag
//!
//! No task body ever waits on a device. A busy radio drops the frame; the next
//! cycle produces a fresh one.

pub mod gate;
pub mod task;

use tracing::{debug, info, warn};

use crate::clock::{Clock, Millis};
use crate::critical_section::CriticalSection;
use crate::indicator::StatusIndicator;
use crate::radio::{
    RadioDriver, RadioGatekeeper, SubmitOutcome, DEFAULT_FREQUENCY_MHZ, DEFAULT_TX_POWER_DBM,
};
use crate::sensors::battery::{BatteryAdc, BatteryConfig, BatteryMonitor};
use crate::sensors::{AltimeterDriver, GpsDriver, ImuDriver, SensorInitReport, SensorSuite};
use crate::storage::{LoggerSink, StorageDriver};
use crate::telemetry::encoder::TelemetryEncoder;
use crate::telemetry::protocol::SystemStatus;

use task::{PeriodicTask, TaskKind};

/// Default telemetry period
pub const DEFAULT_TELEMETRY_PERIOD_MS: Millis = 100;

/// Default battery check period
pub const DEFAULT_BATTERY_PERIOD_MS: Millis = 35_000;

/// Every device the loop drives
pub struct Devices {
    pub gps: Box<dyn GpsDriver + Send>,
    pub altimeter: Box<dyn AltimeterDriver + Send>,
    pub imu: Box<dyn ImuDriver + Send>,
    pub battery: Box<dyn BatteryAdc + Send>,
    pub radio: Box<dyn RadioDriver + Send>,
    pub storage: Box<dyn StorageDriver + Send>,
    pub indicator: Box<dyn StatusIndicator + Send>,
}

/// Timing and radio parameters for the loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub telemetry_period_ms: Millis,
    pub battery_period_ms: Millis,
    pub frequency_mhz: f32,
    pub tx_power_dbm: i8,
    pub battery: BatteryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            telemetry_period_ms: DEFAULT_TELEMETRY_PERIOD_MS,
            battery_period_ms: DEFAULT_BATTERY_PERIOD_MS,
            frequency_mhz: DEFAULT_FREQUENCY_MHZ,
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            battery: BatteryConfig::default(),
        }
    }
}

/// Result of device startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub radio: bool,
    pub sensors: SensorInitReport,
    pub storage: bool,
}

/// What happened during one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Clock reading shared by every task in the pass
    pub now: Millis,

    /// Tasks that ran, in the order they ran
    pub ran: Vec<TaskKind>,

    /// Radio outcome, if a frame was offered
    pub submit: Option<SubmitOutcome>,

    /// Storage outcome, if a frame was logged
    pub logged: Option<bool>,

    /// Telemetry cycle ran but the frame could not be encoded
    pub encode_failed: bool,

    /// Battery voltage, if the battery task ran and the read succeeded
    pub battery_volts: Option<f32>,
}

impl PassReport {
    pub fn ran(&self, kind: TaskKind) -> bool {
        self.ran.contains(&kind)
    }
}

/// Cumulative loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Telemetry cycles run
    pub cycles: u64,
    /// Frames accepted by the radio
    pub frames_sent: u64,
    /// Frames dropped because the radio was busy or offline
    pub frames_dropped: u64,
    pub encode_failures: u64,
    pub log_failures: u64,
    pub battery_checks: u64,
}

/// The cooperative loop and everything it owns
pub struct Scheduler<C> {
    clock: C,
    config: SchedulerConfig,
    tasks: Vec<PeriodicTask>,
    sensors: SensorSuite,
    encoder: TelemetryEncoder,
    radio: RadioGatekeeper,
    logger: LoggerSink,
    battery: BatteryMonitor,
    indicator: Box<dyn StatusIndicator + Send>,
    stats: SchedulerStats,
}

impl<C: Clock> Scheduler<C> {
    /// Builds the loop around a set of devices
    ///
    /// # Arguments
    ///
    /// * `clock` - Millisecond time source
    /// * `devices` - Device handles, not yet initialised
    /// * `config` - Periods and radio settings
    /// * `critical` - Critical section shared with the GPS interrupt
    pub fn new(
        clock: C,
        devices: Devices,
        config: SchedulerConfig,
        critical: CriticalSection,
    ) -> Self {
        let start = clock.now_ms();
        let Devices {
            gps,
            altimeter,
            imu,
            battery,
            radio,
            storage,
            indicator,
        } = devices;

        Self {
            tasks: build_tasks(&config, start),
            sensors: SensorSuite::new(gps, altimeter, imu, critical),
            encoder: TelemetryEncoder::new(),
            radio: RadioGatekeeper::new(radio),
            logger: LoggerSink::new(storage),
            battery: BatteryMonitor::new(battery, config.battery),
            indicator,
            stats: SchedulerStats::default(),
            clock,
            config,
        }
    }

    /// Initialises every device once and anchors the task gates
    ///
    /// Never fails: a device that does not come up is reported and the loop
    /// runs degraded. The status indicator is lit when the radio is offline.
    pub fn start(&mut self) -> StartupReport {
        let radio = self
            .radio
            .start(self.config.frequency_mhz, self.config.tx_power_dbm);
        self.indicator.set(!radio);

        let sensors = self.sensors.init();
        let storage = self.logger.start();

        self.tasks = build_tasks(&self.config, self.clock.now_ms());

        let report = StartupReport {
            radio,
            sensors,
            storage,
        };
        info!("Startup complete: {:?}", report);
        report
    }

    /// Runs one pass of the loop
    ///
    /// The clock is read once; every task whose gate fires runs to completion
    /// before the next task is considered.
    pub fn run_pass(&mut self) -> PassReport {
        let now = self.clock.now_ms();
        let mut report = PassReport {
            now,
            ..PassReport::default()
        };

        for index in 0..self.tasks.len() {
            if !self.tasks[index].poll(now) {
                continue;
            }

            let kind = self.tasks[index].kind;
            report.ran.push(kind);

            match kind {
                TaskKind::Telemetry => self.run_telemetry(now, &mut report),
                TaskKind::BatteryCheck => self.run_battery_check(&mut report),
            }
        }

        report
    }

    fn run_telemetry(&mut self, now: Millis, report: &mut PassReport) {
        self.stats.cycles += 1;

        let link_quality = self.radio.sent_packet_count();
        let snapshot = self.sensors.sample(now, link_quality);
        let status = SystemStatus {
            storage_ok: self.logger.is_ok(),
            low_battery: self.battery.is_low(),
        };

        let frame = match self.encoder.encode(&snapshot, status) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping telemetry cycle at {} ms: {}", now, e);
                self.stats.encode_failures += 1;
                report.encode_failed = true;
                return;
            }
        };

        let logged = match self.logger.append(frame) {
            Ok(()) => true,
            Err(e) => {
                debug!("{}", e);
                self.stats.log_failures += 1;
                false
            }
        };
        report.logged = Some(logged);

        let outcome = self.radio.try_submit(frame);
        if outcome.is_accepted() {
            self.stats.frames_sent += 1;
        } else {
            self.stats.frames_dropped += 1;
        }
        report.submit = Some(outcome);

        debug!(
            "Telemetry at {} ms: fix={} logged={} radio={:?}",
            now,
            snapshot.has_fix(),
            logged,
            outcome
        );
    }

    fn run_battery_check(&mut self, report: &mut PassReport) {
        self.stats.battery_checks += 1;
        report.battery_volts = self.battery.check();
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Periodic tasks in priority order
    pub fn tasks(&self) -> &[PeriodicTask] {
        &self.tasks
    }

    pub fn radio(&self) -> &RadioGatekeeper {
        &self.radio
    }

    /// Low-battery flag as it will appear in the next frame
    pub fn battery_low(&self) -> bool {
        self.battery.is_low()
    }

    /// Storage-ok flag as it will appear in the next frame
    pub fn storage_ok(&self) -> bool {
        self.logger.is_ok()
    }
}

/// Task list in priority order: telemetry first
fn build_tasks(config: &SchedulerConfig, start: Millis) -> Vec<PeriodicTask> {
    vec![
        PeriodicTask::new(
            "telemetry",
            TaskKind::Telemetry,
            config.telemetry_period_ms,
            start,
        ),
        PeriodicTask::new(
            "battery",
            TaskKind::BatteryCheck,
            config.battery_period_ms,
            start,
        ),
    ]
}
