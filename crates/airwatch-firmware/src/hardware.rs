//! Board bring-up for the CoreS3-based monitor
//!
//! Sets up the shared I2C bus, the AXP2101 power management chip and the
//! concrete drivers the core tasks are generic over: the display backlight
//! switch, the battery ADC, the rotary encoder decoder and the SD card clock.

use airwatch_core::async_i2c_bus::SharedI2c;
use airwatch_core::input::{QuadratureDecoder, SharedEncoder};
use airwatch_core::power::{PowerDomain, PowerError, PowerSwitch};
use airwatch_core::sensors::VoltageReader;
use axp2101_embedded::AsyncAxp2101;
use embassy_futures::select::select3;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use esp_hal::analog::adc::{Adc, AdcCalCurve, AdcPin};
use esp_hal::gpio::Input;
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError, I2c};
use esp_hal::peripherals::{ADC1, GPIO10};
use esp_hal::time::Rate;
use log::{error, info, warn};
use static_cell::StaticCell;

pub type I2cBus = I2c<'static, esp_hal::Async>;
pub type SharedBus = SharedI2c<'static, CriticalSectionRawMutex, I2cBus>;
pub type Pmu = AsyncAxp2101<SharedBus>;

/// Create the 400 kHz I2C bus shared by the PMU and the sensors.
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO12<'static>,
    scl: esp_hal::peripherals::GPIO11<'static>,
) -> Result<&'static AsyncMutex<CriticalSectionRawMutex, I2cBus>, ConfigError> {
    static I2C0_BUS: StaticCell<AsyncMutex<CriticalSectionRawMutex, I2cBus>> = StaticCell::new();

    let i2c = I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(400)))?
        .with_sda(sda)
        .with_scl(scl)
        .into_async();
    Ok(I2C0_BUS.init(AsyncMutex::new(i2c)))
}

/// Bring up the AXP2101 rails the board needs.
///
/// ALDO4 feeds the panel at 3.3V; DLDO1 drives the backlight and is the
/// display's power domain from here on.
pub async fn init_pmu(i2c: SharedBus) -> Pmu {
    info!("Configuring power management");
    let mut pmu = AsyncAxp2101::new(i2c);

    if let Err(e) = pmu.init().await {
        warn!("Power init failed: {:?}", e);
    }
    if let Err(e) = pmu
        .set_charging_led_mode(axp2101_embedded::ChargeLedMode::On)
        .await
    {
        warn!("Charge LED setup failed: {:?}", e);
    }

    let rails = [
        pmu.enable_aldo1().await,
        pmu.enable_aldo2().await,
        pmu.enable_aldo3().await,
        pmu.enable_aldo4().await,
        pmu.enable_bldo1().await,
        pmu.enable_bldo2().await,
        pmu.enable_dldo1().await,
        pmu.set_aldo4_voltage(3300).await,
    ];
    for (i, result) in rails.iter().enumerate() {
        if let Err(e) = result {
            error!("Power rail step {} failed: {:?}", i, e);
        }
    }

    info!("Power management ready");
    pmu
}

/// The display domain: the backlight rail on the PMU.
pub struct DisplayBacklight {
    pmu: Pmu,
    enabled: bool,
}

impl DisplayBacklight {
    /// The rail is on after [`init_pmu`].
    pub fn new(pmu: Pmu) -> Self {
        Self { pmu, enabled: true }
    }
}

impl PowerSwitch for DisplayBacklight {
    async fn enable(&mut self) -> Result<(), PowerError> {
        self.pmu.enable_dldo1().await.map_err(|e| {
            error!(" Power: backlight enable failed: {:?}", e);
            PowerError {
                domain: PowerDomain::Display,
                details: "DLDO1 enable failed",
            }
        })?;
        self.enabled = true;
        Ok(())
    }

    async fn disable(&mut self) -> Result<(), PowerError> {
        self.pmu.disable_dldo1().await.map_err(|e| {
            error!(" Power: backlight disable failed: {:?}", e);
            PowerError {
                domain: PowerDomain::Display,
                details: "DLDO1 disable failed",
            }
        })?;
        self.enabled = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Battery divider tap on GPIO10, read through the curve-calibrated ADC so
/// conversions come back in millivolts.
pub struct BatteryAdc {
    adc: Adc<'static, ADC1<'static>, esp_hal::Blocking>,
    pin: AdcPin<GPIO10<'static>, ADC1<'static>, AdcCalCurve<ADC1<'static>>>,
}

impl BatteryAdc {
    pub fn new(adc1: ADC1<'static>, pin: GPIO10<'static>) -> Self {
        let mut config = esp_hal::analog::adc::AdcConfig::new();
        let pin = config.enable_pin_with_cal::<_, AdcCalCurve<ADC1<'static>>>(
            pin,
            esp_hal::analog::adc::Attenuation::_11dB,
        );
        Self {
            adc: Adc::new(adc1, config),
            pin,
        }
    }
}

impl VoltageReader for BatteryAdc {
    type Error = ();

    fn read_millivolts(&mut self) -> Result<u16, ()> {
        nb::block!(self.adc.read_oneshot(&mut self.pin))
    }
}

/// Decode encoder edges into `encoder` until the executor stops polling.
///
/// Both quadrature lines and the button are edge-awaited, so the decoder
/// sees every transition without polling.
pub async fn decode_encoder(
    mut clk: Input<'static>,
    mut dt: Input<'static>,
    mut button: Input<'static>,
    encoder: &SharedEncoder,
    steps_per_detent: i32,
) -> ! {
    let mut decoder = QuadratureDecoder::new(clk.is_high(), dt.is_high(), steps_per_detent);
    encoder.set_position(decoder.position());

    loop {
        select3(
            clk.wait_for_any_edge(),
            dt.wait_for_any_edge(),
            button.wait_for_any_edge(),
        )
        .await;
        decoder.update(clk.is_high(), dt.is_high());
        encoder.set_position(decoder.position());
        encoder.set_pressed(button.is_low());
    }
}

/// FAT timestamps for the config files. The board has no battery-backed
/// clock, so every write is stamped with a fixed date.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedClock;

impl embedded_sdmmc::TimeSource for FixedClock {
    fn get_timestamp(&self) -> embedded_sdmmc::Timestamp {
        embedded_sdmmc::Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}
