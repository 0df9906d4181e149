//! Battery voltage sensing through a resistor divider

use core::fmt::Debug;

use log::error;

use super::{BatteryReadings, Sensor, SensorError};

/// Voltage treated as 0% charge.
pub const V_EMPTY: f32 = 3.0;
/// Voltage treated as 100% charge.
pub const V_FULL: f32 = 4.2;

/// A calibrated ADC channel reporting the divider output in millivolts.
pub trait VoltageReader {
    type Error: Debug;

    fn read_millivolts(&mut self) -> Result<u16, Self::Error>;
}

/// Linear charge estimate between [`V_EMPTY`] and [`V_FULL`], clamped and
/// rounded to the nearest percent.
pub fn battery_percent(voltage: f32) -> u8 {
    if voltage <= V_EMPTY {
        0
    } else if voltage >= V_FULL {
        100
    } else {
        ((voltage - V_EMPTY) / (V_FULL - V_EMPTY) * 100.0 + 0.5) as u8
    }
}

pub struct BatteryMonitor<A> {
    adc: A,
    divider_ratio: f32,
}

impl<A: VoltageReader> BatteryMonitor<A> {
    /// `divider_ratio` is battery voltage over ADC input voltage (2.0 for
    /// two equal resistors).
    pub fn new(adc: A, divider_ratio: f32) -> Self {
        Self { adc, divider_ratio }
    }
}

impl<A: VoltageReader> Sensor for BatteryMonitor<A> {
    type Readings = BatteryReadings;
    const NAME: &'static str = "BATTERY";

    async fn read(&mut self) -> Result<BatteryReadings, SensorError> {
        let millivolts = self.adc.read_millivolts().map_err(|e| {
            error!("Battery ADC read failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: "BATTERY",
                operation: "sample divider voltage",
                details: "ADC conversion error",
            }
        })?;

        let voltage = millivolts as f32 / 1000.0 * self.divider_ratio;

        Ok(BatteryReadings {
            voltage: Some(voltage),
            percent: Some(battery_percent(voltage)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    struct FixedAdc(Option<u16>);

    impl VoltageReader for FixedAdc {
        type Error = ();

        fn read_millivolts(&mut self) -> Result<u16, ()> {
            self.0.ok_or(())
        }
    }

    #[test]
    fn test_percent_is_clamped_and_linear() {
        assert_eq!(battery_percent(2.8), 0);
        assert_eq!(battery_percent(3.0), 0);
        assert_eq!(battery_percent(3.6), 50);
        assert_eq!(battery_percent(4.2), 100);
        assert_eq!(battery_percent(4.4), 100);
    }

    #[test]
    fn test_read_applies_divider() {
        let mut monitor = BatteryMonitor::new(FixedAdc(Some(1900)), 2.0);
        let readings = block_on(monitor.read()).unwrap();
        let v = readings.voltage.unwrap();
        assert!((v - 3.8).abs() < 0.001, "voltage was {}", v);
        assert_eq!(readings.percent, Some(67));
    }

    #[test]
    fn test_adc_error_is_read_failure() {
        let mut monitor = BatteryMonitor::new(FixedAdc(None), 2.0);
        assert!(matches!(
            block_on(monitor.read()),
            Err(SensorError::ReadFailed { .. })
        ));
    }
}
