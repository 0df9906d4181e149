//! ScioSense APC1 particulate / gas sensor over I2C
//!
//! The whole measurement block is fetched in one write-read so that every
//! field in a reading comes from the same sensor update.

use embedded_hal_async::i2c::I2c;
use log::error;

use super::{ParticulateReadings, Sensor, SensorError};

pub const APC1_DEFAULT_ADDRESS: u8 = 0x12;

/// First register of the measurement block (PM1.0).
const BLOCK_START: u8 = 0x04;
/// Last register of the measurement block (TVOC AQI).
const BLOCK_END: u8 = 0x3A;
const BLOCK_LEN: usize = (BLOCK_END - BLOCK_START + 1) as usize;

const REG_PM1: u8 = 0x04;
const REG_PM25: u8 = 0x06;
const REG_PM10: u8 = 0x08;
const REG_TVOC: u8 = 0x1C;
const REG_ECO2: u8 = 0x1E;
const REG_T_COMP: u8 = 0x22;
const REG_RH_COMP: u8 = 0x24;
const REG_AQI_TVOC: u8 = 0x3A;

/// Upper bound of the PM measurement range in µg/m³.
const PM_MAX: f32 = 1000.0;

pub struct Apc1Sensor<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Apc1Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, APC1_DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Read one register; used at startup to decide whether it is present.
    pub async fn detect(&mut self) -> Result<(), SensorError> {
        let mut byte = [0u8; 1];
        self.i2c
            .write_read(self.address, &[REG_AQI_TVOC], &mut byte)
            .await
            .map_err(|_| SensorError::NotPresent { sensor: "APC1" })
    }
}

fn word(block: &[u8; BLOCK_LEN], reg: u8) -> u16 {
    let at = (reg - BLOCK_START) as usize;
    u16::from_be_bytes([block[at], block[at + 1]])
}

/// Decode a raw measurement block into readings.
fn decode(block: &[u8; BLOCK_LEN]) -> Result<ParticulateReadings, SensorError> {
    let pm1 = word(block, REG_PM1) as f32;
    let pm25 = word(block, REG_PM25) as f32;
    let pm10 = word(block, REG_PM10) as f32;

    if pm1 > PM_MAX || pm25 > PM_MAX || pm10 > PM_MAX {
        return Err(SensorError::InvalidData {
            sensor: "APC1",
            details: "PM concentration out of range",
        });
    }

    let aqi_tvoc = block[(REG_AQI_TVOC - BLOCK_START) as usize];

    Ok(ParticulateReadings {
        pm1: Some(pm1),
        pm25: Some(pm25),
        pm10: Some(pm10),
        tvoc_ppb: Some(word(block, REG_TVOC) as f32),
        eco2_ppm: Some(word(block, REG_ECO2) as f32),
        aqi_tvoc: (aqi_tvoc != 0).then_some(aqi_tvoc),
        temperature_comp_c: Some(word(block, REG_T_COMP) as f32 * 0.1),
        humidity_comp_pct: Some(word(block, REG_RH_COMP) as f32 * 0.1),
    })
}

impl<I: I2c> Sensor for Apc1Sensor<I> {
    type Readings = ParticulateReadings;
    const NAME: &'static str = "APC1";

    async fn read(&mut self) -> Result<ParticulateReadings, SensorError> {
        let mut block = [0u8; BLOCK_LEN];
        self.i2c
            .write_read(self.address, &[BLOCK_START], &mut block)
            .await
            .map_err(|e| {
                error!("APC1 block read failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "APC1",
                    operation: "read measurement block",
                    details: "I2C communication error",
                }
            })?;

        decode(&block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_async::i2c::{ErrorType, Operation};

    /// Register image answering write-read transactions.
    struct MockBus {
        registers: [u8; 0x40],
        fail: bool,
    }

    impl ErrorType for MockBus {
        type Error = ErrorKind;
    }

    impl I2c for MockBus {
        async fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Bus);
            }
            let mut reg = 0usize;
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => reg = bytes[0] as usize,
                    Operation::Read(buf) => {
                        let len = buf.len();
                        buf.copy_from_slice(&self.registers[reg..reg + len]);
                    }
                }
            }
            Ok(())
        }
    }

    fn bus_with(pm25: u16) -> MockBus {
        let mut registers = [0u8; 0x40];
        let mut put = |reg: u8, value: u16| {
            let [hi, lo] = value.to_be_bytes();
            registers[reg as usize] = hi;
            registers[reg as usize + 1] = lo;
        };
        put(REG_PM1, 5);
        put(REG_PM25, pm25);
        put(REG_PM10, 20);
        put(REG_TVOC, 120);
        put(REG_ECO2, 650);
        put(REG_T_COMP, 215);
        put(REG_RH_COMP, 455);
        registers[REG_AQI_TVOC as usize] = 2;
        MockBus {
            registers,
            fail: false,
        }
    }

    #[test]
    fn test_read_decodes_block() {
        let mut sensor = Apc1Sensor::new(bus_with(12));
        let readings = block_on(sensor.read()).ok().unwrap();
        assert_eq!(readings.pm1, Some(5.0));
        assert_eq!(readings.pm25, Some(12.0));
        assert_eq!(readings.pm10, Some(20.0));
        assert_eq!(readings.eco2_ppm, Some(650.0));
        assert_eq!(readings.aqi_tvoc, Some(2));
        let t = readings.temperature_comp_c.unwrap();
        assert!((t - 21.5).abs() < 0.01, "compensated temperature was {}", t);
    }

    #[test]
    fn test_out_of_range_is_invalid() {
        let mut sensor = Apc1Sensor::new(bus_with(5000));
        let result = block_on(sensor.read());
        assert!(matches!(result, Err(SensorError::InvalidData { .. })));
    }

    #[test]
    fn test_bus_error_is_read_failure() {
        let mut bus = bus_with(10);
        bus.fail = true;
        let mut sensor = Apc1Sensor::new(bus);
        assert!(matches!(
            block_on(sensor.read()),
            Err(SensorError::ReadFailed { .. })
        ));
        assert_eq!(
            block_on(sensor.detect()),
            Err(SensorError::NotPresent { sensor: "APC1" })
        );
    }
}
