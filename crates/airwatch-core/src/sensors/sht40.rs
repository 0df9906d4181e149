use embedded_hal_async::i2c::I2c;
use log::error;
use sht4x::Sht4xAsync;

use super::{ClimateReadings, Sensor, SensorError};

/// Plausible operating range of the SHT40; anything outside is a bad frame.
const TEMPERATURE_RANGE_C: core::ops::RangeInclusive<f32> = -40.0..=125.0;

pub struct SHT40Sensor<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
}

impl<I: I2c> SHT40Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
        }
    }
}

impl<I: I2c> Sensor for SHT40Sensor<I> {
    type Readings = ClimateReadings;
    const NAME: &'static str = "SHT40";

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        let temperature = measurement.temperature_celsius().to_num::<f32>();
        if !TEMPERATURE_RANGE_C.contains(&temperature) {
            return Err(SensorError::InvalidData {
                sensor: "SHT40",
                details: "temperature outside sensor range",
            });
        }

        // The raw conversion can overshoot slightly at the ends of the range
        let humidity = measurement
            .humidity_percent()
            .to_num::<f32>()
            .clamp(0.0, 100.0);

        Ok(ClimateReadings {
            temperature_c: Some(temperature),
            humidity_pct: Some(humidity),
        })
    }
}
