//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values take the defaults
//! below, which match `config/default.toml`. An empty `port` selects the
//! simulated device for that link.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::clock::Millis;
use crate::error::{FlightError, Result};
use crate::scheduler::SchedulerConfig;
use crate::sensors::battery::BatteryConfig;
use crate::storage::file::LogFormat;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub battery: BatterySettings,

    #[serde(default)]
    pub radio: RadioConfig,

    #[serde(default)]
    pub gps: GpsConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Loop timing
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_telemetry_period_ms")]
    pub telemetry_period_ms: Millis,

    #[serde(default = "default_battery_period_ms")]
    pub battery_period_ms: Millis,

    /// Spacing of scheduler passes
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,

    #[serde(default = "default_gps_poll_hz")]
    pub gps_poll_hz: u32,
}

/// Battery ADC scaling and threshold
#[derive(Debug, Deserialize, Clone)]
pub struct BatterySettings {
    #[serde(default = "default_low_voltage_threshold")]
    pub low_voltage_threshold: f32,

    #[serde(default = "default_adc_scale")]
    pub adc_scale: f32,

    #[serde(default = "default_adc_resolution")]
    pub adc_resolution: u16,
}

/// Radio modem configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_radio_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_frequency_mhz")]
    pub frequency_mhz: f32,

    #[serde(default = "default_tx_power_dbm")]
    pub tx_power_dbm: i8,

    /// Exit at startup instead of running without a radio
    #[serde(default)]
    pub halt_on_init_failure: bool,

    /// Airtime of one frame on the simulated radio
    #[serde(default = "default_sim_airtime_ms")]
    pub sim_airtime_ms: Millis,
}

/// GPS receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpsConfig {
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_gps_baud_rate")]
    pub baud_rate: u32,
}

/// Frame log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_telemetry_period_ms() -> Millis { 100 }
fn default_battery_period_ms() -> Millis { 35_000 }
fn default_loop_interval_ms() -> u64 { 10 }
fn default_gps_poll_hz() -> u32 { 1000 }

fn default_low_voltage_threshold() -> f32 { 3.4 }
fn default_adc_scale() -> f32 { 6.6 }
fn default_adc_resolution() -> u16 { 1024 }

fn default_radio_baud_rate() -> u32 { 57_600 }
fn default_frequency_mhz() -> f32 { 915.0 }
fn default_tx_power_dbm() -> i8 { 23 }
fn default_sim_airtime_ms() -> Millis { 60 }

fn default_gps_baud_rate() -> u32 { 9600 }

fn default_storage_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            telemetry_period_ms: default_telemetry_period_ms(),
            battery_period_ms: default_battery_period_ms(),
            loop_interval_ms: default_loop_interval_ms(),
            gps_poll_hz: default_gps_poll_hz(),
        }
    }
}

impl Default for BatterySettings {
    fn default() -> Self {
        Self {
            low_voltage_threshold: default_low_voltage_threshold(),
            adc_scale: default_adc_scale(),
            adc_resolution: default_adc_resolution(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_radio_baud_rate(),
            frequency_mhz: default_frequency_mhz(),
            tx_power_dbm: default_tx_power_dbm(),
            halt_on_init_failure: false,
            sim_airtime_ms: default_sim_airtime_ms(),
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_gps_baud_rate(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            log_dir: default_log_dir(),
            format: LogFormat::default(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> FlightError {
    FlightError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;

        if timing.telemetry_period_ms == 0 || timing.telemetry_period_ms > 60_000 {
            return Err(invalid("telemetry_period_ms must be between 1 and 60000"));
        }

        if timing.battery_period_ms == 0 || timing.battery_period_ms > 3_600_000 {
            return Err(invalid("battery_period_ms must be between 1 and 3600000"));
        }

        // Passes must come at least as often as the fastest task
        if timing.loop_interval_ms == 0
            || timing.loop_interval_ms > u64::from(timing.telemetry_period_ms)
        {
            return Err(invalid(
                "loop_interval_ms must be between 1 and telemetry_period_ms",
            ));
        }

        if timing.gps_poll_hz == 0 || timing.gps_poll_hz > 10_000 {
            return Err(invalid("gps_poll_hz must be between 1 and 10000"));
        }

        // Battery scaling
        let battery = &self.battery;
        if !battery.adc_scale.is_finite() || battery.adc_scale <= 0.0 {
            return Err(invalid("adc_scale must be a positive number"));
        }

        if battery.adc_resolution == 0 {
            return Err(invalid("adc_resolution must be greater than 0"));
        }

        if !battery.low_voltage_threshold.is_finite()
            || battery.low_voltage_threshold <= 0.0
            || battery.low_voltage_threshold >= battery.adc_scale
        {
            return Err(invalid(
                "low_voltage_threshold must be greater than 0 and below adc_scale",
            ));
        }

        // Radio
        if !(137.0..=1020.0).contains(&self.radio.frequency_mhz) {
            return Err(invalid("frequency_mhz must be between 137 and 1020"));
        }

        if !(-4..=23).contains(&self.radio.tx_power_dbm) {
            return Err(invalid("tx_power_dbm must be between -4 and 23"));
        }

        if self.radio.sim_airtime_ms > 10_000 {
            return Err(invalid("sim_airtime_ms must be at most 10000"));
        }

        for (name, baud) in [
            ("radio baud_rate", self.radio.baud_rate),
            ("gps baud_rate", self.gps.baud_rate),
        ] {
            if !is_standard_baud(baud) {
                return Err(invalid(format!("{} {} is not a standard rate", name, baud)));
            }
        }

        // Storage
        if self.storage.enabled && self.storage.log_dir.is_empty() {
            return Err(invalid("storage log_dir cannot be empty when enabled"));
        }

        if self.storage.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.storage.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }

    /// Scheduler parameters derived from this configuration
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            telemetry_period_ms: self.timing.telemetry_period_ms,
            battery_period_ms: self.timing.battery_period_ms,
            frequency_mhz: self.radio.frequency_mhz,
            tx_power_dbm: self.radio.tx_power_dbm,
            battery: BatteryConfig {
                adc_scale: self.battery.adc_scale,
                adc_resolution: self.battery.adc_resolution,
                low_voltage: self.battery.low_voltage_threshold,
            },
        }
    }
}

fn is_standard_baud(baud: u32) -> bool {
    matches!(
        baud,
        4800 | 9600 | 19_200 | 38_400 | 57_600 | 115_200 | 230_400 | 460_800 | 921_600
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            timing: TimingConfig {
                telemetry_period_ms: 100,
                battery_period_ms: 35_000,
                loop_interval_ms: 10,
                gps_poll_hz: 1000,
            },
            battery: BatterySettings {
                low_voltage_threshold: 3.4,
                adc_scale: 6.6,
                adc_resolution: 1024,
            },
            radio: RadioConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 57_600,
                frequency_mhz: 915.0,
                tx_power_dbm: 23,
                halt_on_init_failure: false,
                sim_airtime_ms: 60,
            },
            gps: GpsConfig {
                port: "/dev/ttyAMA0".to_string(),
                baud_rate: 9600,
            },
            storage: StorageConfig {
                enabled: true,
                log_dir: "./logs".to_string(),
                format: LogFormat::Jsonl,
                max_records_per_file: 10000,
                max_files_to_keep: 10,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.radio.port.is_empty());
        assert!(config.gps.port.is_empty());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.timing.telemetry_period_ms, 100);
        assert_eq!(config.timing.battery_period_ms, 35_000);
        assert_eq!(config.timing.gps_poll_hz, 1000);
        assert_eq!(config.radio.frequency_mhz, 915.0);
        assert_eq!(config.radio.tx_power_dbm, 23);
        assert_eq!(config.storage.format, LogFormat::Jsonl);
    }

    #[test]
    fn test_partial_section() {
        let config = Config::from_toml(
            r#"
            [timing]
            telemetry_period_ms = 200

            [storage]
            format = "binary"
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.telemetry_period_ms, 200);
        assert_eq!(config.timing.loop_interval_ms, 10);
        assert_eq!(config.storage.format, LogFormat::Binary);
        assert!(config.storage.enabled);
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [radio]
            port = "/dev/ttyUSB1"
            frequency_mhz = 868.0
            tx_power_dbm = 14
            halt_on_init_failure = true

            [battery]
            low_voltage_threshold = 3.5
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.radio.port, "/dev/ttyUSB1");
        assert_eq!(config.radio.frequency_mhz, 868.0);
        assert_eq!(config.radio.tx_power_dbm, 14);
        assert!(config.radio.halt_on_init_failure);
        assert_eq!(config.battery.low_voltage_threshold, 3.5);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(FlightError::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = Config::from_toml("[timing\ntelemetry_period_ms = ");
        assert!(matches!(result, Err(FlightError::Config(_))));
    }

    #[test]
    fn test_invalid_log_format() {
        let result = Config::from_toml("[storage]\nformat = \"csv\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_telemetry_period_zero() {
        let mut config = create_valid_config();
        config.timing.telemetry_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_battery_period_zero() {
        let mut config = create_valid_config();
        config.timing.battery_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loop_interval_longer_than_telemetry_period() {
        let mut config = create_valid_config();
        config.timing.loop_interval_ms = 150;
        assert!(config.validate().is_err());

        config.timing.loop_interval_ms = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gps_poll_hz_range() {
        let mut config = create_valid_config();
        config.timing.gps_poll_hz = 0;
        assert!(config.validate().is_err());

        config.timing.gps_poll_hz = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_adc_scale_invalid() {
        let mut config = create_valid_config();
        config.battery.adc_scale = 0.0;
        assert!(config.validate().is_err());

        config.battery.adc_scale = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_adc_resolution_zero() {
        let mut config = create_valid_config();
        config.battery.adc_resolution = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_low_voltage_above_full_scale() {
        let mut config = create_valid_config();
        config.battery.low_voltage_threshold = 7.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frequency_out_of_range() {
        let mut config = create_valid_config();
        config.radio.frequency_mhz = 2400.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_frequencies() {
        for &mhz in &[433.0, 868.0, 915.0] {
            let mut config = create_valid_config();
            config.radio.frequency_mhz = mhz;
            assert!(config.validate().is_ok(), "Frequency {} should be valid", mhz);
        }
    }

    #[test]
    fn test_tx_power_out_of_range() {
        let mut config = create_valid_config();
        config.radio.tx_power_dbm = 30;
        assert!(config.validate().is_err());

        config.radio.tx_power_dbm = -10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.gps.baud_rate = 420_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in &[9600, 38_400, 57_600, 115_200] {
            let mut config = create_valid_config();
            config.radio.baud_rate = baud;
            config.gps.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_storage_empty_log_dir() {
        let mut config = create_valid_config();
        config.storage.log_dir = String::new();
        assert!(config.validate().is_err());

        config.storage.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_limits_zero() {
        let mut config = create_valid_config();
        config.storage.max_records_per_file = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.storage.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scheduler_config() {
        let mut config = create_valid_config();
        config.timing.telemetry_period_ms = 250;
        config.battery.low_voltage_threshold = 3.6;

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.telemetry_period_ms, 250);
        assert_eq!(scheduler.battery_period_ms, 35_000);
        assert_eq!(scheduler.battery.low_voltage, 3.6);
        assert_eq!(scheduler.frequency_mhz, 915.0);
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_telemetry_period_ms(), 100);
        assert_eq!(default_battery_period_ms(), 35_000);
        assert_eq!(default_loop_interval_ms(), 10);
        assert_eq!(default_gps_poll_hz(), 1000);
        assert_eq!(default_low_voltage_threshold(), 3.4);
        assert_eq!(default_adc_scale(), 6.6);
        assert_eq!(default_adc_resolution(), 1024);
        assert_eq!(default_radio_baud_rate(), 57_600);
        assert_eq!(default_frequency_mhz(), 915.0);
        assert_eq!(default_tx_power_dbm(), 23);
        assert_eq!(default_sim_airtime_ms(), 60);
        assert_eq!(default_gps_baud_rate(), 9600);
        assert!(default_storage_enabled());
        assert_eq!(default_log_dir(), "./logs");
        assert_eq!(default_max_records_per_file(), 10000);
        assert_eq!(default_max_files_to_keep(), 10);
    }
}
