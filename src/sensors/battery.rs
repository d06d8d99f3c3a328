//! # Battery Monitor
//!
//! Converts raw ADC samples of the battery divider into volts and keeps the
//! low-battery flag. The flag is a pure function of the latest successful
//! sample; there is no hysteresis.

use tracing::{debug, warn};

use crate::error::Result;

/// Default ADC scale: 1/2 divider against a 3.3 V reference
pub const DEFAULT_ADC_SCALE: f32 = 6.6;

/// Default ADC resolution (10-bit)
pub const DEFAULT_ADC_RESOLUTION: u16 = 1024;

/// Default low-battery threshold in volts
pub const DEFAULT_LOW_VOLTAGE: f32 = 3.4;

/// Battery voltage ADC channel
#[cfg_attr(test, mockall::automock)]
pub trait BatteryAdc {
    /// Reads one raw sample
    fn read_raw(&mut self) -> Result<u16>;
}

/// Scaling and threshold for the battery check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryConfig {
    /// Volts per full-scale count range (divider ratio × reference)
    pub adc_scale: f32,

    /// Number of ADC counts at full scale
    pub adc_resolution: u16,

    /// Below this voltage the battery is reported low
    pub low_voltage: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            adc_scale: DEFAULT_ADC_SCALE,
            adc_resolution: DEFAULT_ADC_RESOLUTION,
            low_voltage: DEFAULT_LOW_VOLTAGE,
        }
    }
}

impl BatteryConfig {
    /// Converts raw counts to volts
    pub fn to_volts(&self, raw: u16) -> f32 {
        f32::from(raw) * self.adc_scale / f32::from(self.adc_resolution.max(1))
    }
}

/// Periodic battery check
pub struct BatteryMonitor {
    adc: Box<dyn BatteryAdc + Send>,
    config: BatteryConfig,
    low: bool,
    last_voltage: Option<f32>,
}

impl BatteryMonitor {
    pub fn new(adc: Box<dyn BatteryAdc + Send>, config: BatteryConfig) -> Self {
        Self {
            adc,
            config,
            low: false,
            last_voltage: None,
        }
    }

    /// Samples the battery and recomputes the low flag
    ///
    /// A failed read leaves the previous flag in place.
    ///
    /// # Returns
    ///
    /// * `Option<f32>` - Measured voltage, or `None` if the read failed
    pub fn check(&mut self) -> Option<f32> {
        match self.adc.read_raw() {
            Ok(raw) => {
                let volts = self.config.to_volts(raw);
                let low = volts < self.config.low_voltage;

                if low && !self.low {
                    warn!(
                        "Battery low: {:.2} V (threshold {:.2} V)",
                        volts, self.config.low_voltage
                    );
                } else if !low && self.low {
                    debug!("Battery recovered: {:.2} V", volts);
                }

                self.low = low;
                self.last_voltage = Some(volts);
                Some(volts)
            }
            Err(e) => {
                warn!("Battery read failed, keeping previous status: {}", e);
                None
            }
        }
    }

    /// Low-battery flag from the last successful sample
    pub fn is_low(&self) -> bool {
        self.low
    }

    /// Last measured voltage
    pub fn last_voltage(&self) -> Option<f32> {
        self.last_voltage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlightError;

    fn monitor_with(samples: Vec<Result<u16>>) -> BatteryMonitor {
        let mut adc = MockBatteryAdc::new();
        let mut samples = samples.into_iter();
        adc.expect_read_raw().returning(move || {
            samples
                .next()
                .unwrap_or_else(|| Err(FlightError::Sensor("exhausted".to_string())))
        });
        BatteryMonitor::new(Box::new(adc), BatteryConfig::default())
    }

    #[test]
    fn test_to_volts() {
        let config = BatteryConfig::default();
        assert_eq!(config.to_volts(0), 0.0);
        assert!((config.to_volts(512) - 3.3).abs() < 1e-4);
        assert!((config.to_volts(620) - 3.996_093_8).abs() < 1e-4);
    }

    #[test]
    fn test_low_then_recovered_without_hysteresis() {
        // 512 counts = 3.3 V, 621 counts ≈ 4.0 V
        let mut monitor = monitor_with(vec![Ok(512), Ok(621)]);

        assert!(!monitor.is_low());
        monitor.check();
        assert!(monitor.is_low());
        monitor.check();
        assert!(!monitor.is_low());
    }

    #[test]
    fn test_read_failure_keeps_flag() {
        let mut monitor = monitor_with(vec![
            Ok(512),
            Err(FlightError::Sensor("adc busy".to_string())),
        ]);

        assert!(monitor.check().is_some());
        assert!(monitor.check().is_none());
        assert!(monitor.is_low());
        assert!((monitor.last_voltage().unwrap() - 3.3).abs() < 1e-4);
    }

    #[test]
    fn test_exactly_threshold_is_not_low() {
        let mut adc = MockBatteryAdc::new();
        adc.expect_read_raw().returning(|| Ok(100));
        let config = BatteryConfig {
            adc_scale: 34.0,
            adc_resolution: 1000,
            low_voltage: 3.4,
        };
        let mut monitor = BatteryMonitor::new(Box::new(adc), config);

        monitor.check();
        assert!(!monitor.is_low());
    }
}
