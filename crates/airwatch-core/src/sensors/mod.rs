//! Sensor driver contracts and typed readings
//!
//! Drivers implement [`Sensor`] and report partial results as `None` fields.
//! Tasks never call a driver directly; they go through [`acquire`], which
//! bounds the read with a timeout and folds every outcome into an
//! [`Acquisition`].

pub mod apc1;
pub mod battery;
#[cfg(feature = "sensor-sht40")]
pub mod sht40;

use embassy_time::{Duration, with_timeout};

pub use crate::error::SensorError;
pub use apc1::Apc1Sensor;
pub use battery::{BatteryMonitor, VoltageReader};
#[cfg(feature = "sensor-sht40")]
pub use sht40::SHT40Sensor;

/// Trait for sensors that produce typed readings.
pub trait Sensor {
    /// The type of readings this sensor produces.
    type Readings: Copy;

    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition<T> {
    /// The sensor answered.
    Ok(T),
    /// No sensor was detected at startup.
    Absent,
    /// The sensor is present but the read failed or timed out.
    Failed(SensorError),
}

impl<T> Acquisition<T> {
    /// Values to commit to the cache; `None` for any failure.
    pub fn into_values(self) -> Option<T> {
        match self {
            Acquisition::Ok(values) => Some(values),
            Acquisition::Absent | Acquisition::Failed(_) => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Acquisition::Ok(_))
    }
}

/// Read `sensor` once, bounded by `timeout`.
///
/// A timeout is reported as [`SensorError::Timeout`], never as a panic or a
/// stalled task.
pub async fn acquire<S: Sensor>(sensor: Option<&mut S>, timeout: Duration) -> Acquisition<S::Readings> {
    let Some(sensor) = sensor else {
        return Acquisition::Absent;
    };

    match with_timeout(timeout, sensor.read()).await {
        Ok(Ok(readings)) => Acquisition::Ok(readings),
        Ok(Err(e)) => Acquisition::Failed(e),
        Err(_) => Acquisition::Failed(SensorError::Timeout {
            sensor: S::NAME,
            operation: "read",
        }),
    }
}

/// Temperature and relative humidity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClimateReadings {
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
}

/// Particulate and gas readings from the air quality sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParticulateReadings {
    pub pm1: Option<f32>,
    pub pm25: Option<f32>,
    pub pm10: Option<f32>,
    pub tvoc_ppb: Option<f32>,
    pub eco2_ppm: Option<f32>,
    /// Sensor-reported air quality index derived from TVOC (1-5).
    pub aqi_tvoc: Option<u8>,
    pub temperature_comp_c: Option<f32>,
    pub humidity_comp_pct: Option<f32>,
}

/// Battery voltage and estimated charge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatteryReadings {
    pub voltage: Option<f32>,
    pub percent: Option<u8>,
}

impl BatteryReadings {
    /// Voltage at which the pack is assumed to be on the charger.
    pub const CHARGING_THRESHOLD_V: f32 = 4.25;

    pub fn is_charging(&self) -> bool {
        self.voltage
            .is_some_and(|v| v >= Self::CHARGING_THRESHOLD_V)
    }
}
