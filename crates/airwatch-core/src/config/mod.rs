//! Persisted configuration
//!
//! Three independent records, each stored under its own key so that
//! resetting one (typically the WiFi credentials) cannot corrupt the others:
//!
//! - [`Settings`]: static tuning, pin mapping and feature toggles
//! - [`WifiCredentials`]: network association
//! - [`RuntimeState`]: operating mode and screen timeout chosen on-device

mod sd_card;
mod store;

pub use sd_card::SdCardStore;
pub use store::{Config, ConfigStore, KeyValueStore, MemoryStore, Persisted, SharedStore};

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::cache::StaleLimits;
use crate::power::{DomainPolicy, DutyCycleConfig};

/// Which state machine owns the particulate sensor.
///
/// Changing the mode takes effect after a reset, since the task roster is
/// decided from it at startup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Idle-driven sleep for every domain.
    #[default]
    Mobile,
    /// Fixed particulate duty cycle; idle sleep for the display only.
    Station,
}

impl OperatingMode {
    pub fn label(&self) -> &'static str {
        match self {
            OperatingMode::Mobile => "Mobile",
            OperatingMode::Station => "Station",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorIntervals {
    pub climate_s: u16,
    pub particulate_s: u16,
    pub battery_s: u16,
}

impl Default for SensorIntervals {
    fn default() -> Self {
        Self {
            climate_s: 5,
            particulate_s: 10,
            battery_s: 15,
        }
    }
}

/// GPIO numbers for the lines the firmware drives directly.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub i2c_sda: u8,
    pub i2c_scl: u8,
    pub particulate_enable: u8,
    pub particulate_reset: u8,
    pub encoder_clk: u8,
    pub encoder_dt: u8,
    pub encoder_button: u8,
    pub battery_adc: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            i2c_sda: 12,
            i2c_scl: 11,
            particulate_enable: 18,
            particulate_reset: 7,
            encoder_clk: 8,
            encoder_dt: 9,
            encoder_button: 17,
            battery_adc: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub intervals: SensorIntervals,
    pub display_fps: u8,
    pub input_poll_hz: u16,
    pub debounce_ms: u16,
    /// Idle seconds before the display sleeps; `0` never sleeps.
    pub display_threshold_s: u16,
    /// Idle seconds before the particulate sensor sleeps in mobile mode.
    pub particulate_threshold_s: u16,
    pub station_period_s: u16,
    pub station_warmup_s: u16,
    pub station_settle_ms: u16,
    pub sensor_timeout_ms: u16,
    pub network_enabled: bool,
    pub publish_enabled: bool,
    pub publish_interval_s: u16,
    pub watchdog_timeout_s: u16,
    /// Local time offset from UTC, in minutes.
    pub utc_offset_min: i16,
    pub pins: PinMap,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            intervals: SensorIntervals::default(),
            display_fps: 20,
            input_poll_hz: 50,
            debounce_ms: 200,
            display_threshold_s: 30,
            particulate_threshold_s: 300,
            station_period_s: 300,
            station_warmup_s: 60,
            station_settle_ms: 500,
            sensor_timeout_ms: 1000,
            network_enabled: true,
            publish_enabled: true,
            publish_interval_s: 60,
            watchdog_timeout_s: 8,
            utc_offset_min: 0,
            pins: PinMap::default(),
        }
    }
}

impl Settings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.display_fps.max(1) as u64)
    }

    pub fn input_poll_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.input_poll_hz.max(1) as u64)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms as u64)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms as u64)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_s as u64)
    }

    pub fn particulate_policy(&self) -> DomainPolicy {
        DomainPolicy::new(self.particulate_threshold_s)
    }

    /// Two missed sampling rounds before a group is shown as out of date.
    /// In station mode particulate values are read once per duty period.
    pub fn stale_limits(&self, mode: OperatingMode) -> StaleLimits {
        let twice = |s: u16| Duration::from_secs(2 * s as u64);
        let particulate = match mode {
            OperatingMode::Mobile => self.intervals.particulate_s,
            OperatingMode::Station => self.station_period_s,
        };
        StaleLimits {
            climate: twice(self.intervals.climate_s),
            particulate: twice(particulate),
            battery: twice(self.intervals.battery_s),
        }
    }

    pub fn duty_cycle(&self) -> DutyCycleConfig {
        DutyCycleConfig {
            period: Duration::from_secs(self.station_period_s as u64),
            warmup: Duration::from_secs(self.station_warmup_s as u64),
            settle: Duration::from_millis(self.station_settle_ms as u64),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
    /// Seconds between reconnection attempts.
    pub retry_interval_s: u16,
}

impl Default for WifiCredentials {
    fn default() -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            retry_interval_s: 60,
        }
    }
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Self {
        Self {
            ssid: crate::error::message(ssid),
            password: crate::error::message(password),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_s as u64)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeState {
    pub mode: OperatingMode,
    pub screen_timeout_s: u16,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Mobile,
            screen_timeout_s: Settings::default().display_threshold_s,
        }
    }
}

impl RuntimeState {
    pub fn display_policy(&self) -> DomainPolicy {
        DomainPolicy::new(self.screen_timeout_s)
    }
}

impl Persisted for Settings {
    const KEY: &'static str = "SETTINGS.BIN";
}

impl Persisted for WifiCredentials {
    const KEY: &'static str = "WIFI.BIN";
}

impl Persisted for RuntimeState {
    const KEY: &'static str = "RUNTIME.BIN";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.frame_interval(), Duration::from_millis(50));
        assert_eq!(settings.input_poll_interval(), Duration::from_millis(20));
        assert_eq!(settings.duty_cycle().settle, Duration::from_millis(500));
        assert_eq!(settings.particulate_policy().threshold_s, 300);
    }

    #[test]
    fn test_stale_limits_follow_mode() {
        let settings = Settings::default();
        let mobile = settings.stale_limits(OperatingMode::Mobile);
        assert_eq!(mobile.climate, Duration::from_secs(10));
        assert_eq!(mobile.particulate, Duration::from_secs(20));
        let station = settings.stale_limits(OperatingMode::Station);
        assert_eq!(station.particulate, Duration::from_secs(600));
    }

    #[test]
    fn test_runtime_defaults_follow_display_threshold() {
        let runtime = RuntimeState::default();
        assert_eq!(runtime.mode, OperatingMode::Mobile);
        assert_eq!(runtime.screen_timeout_s, 30);
    }

    #[test]
    fn test_wifi_credentials() {
        assert!(!WifiCredentials::default().is_configured());
        let creds = WifiCredentials::new("lab", "hunter22");
        assert!(creds.is_configured());
        assert_eq!(creds.retry_interval(), Duration::from_secs(60));
    }
}
