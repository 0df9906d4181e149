//! Whole-device control: reset, halt and the RTC watchdog

use airwatch_core::tasks::{SystemControl, Watchdog};
use esp_hal::rtc_cntl::{Rtc, RwdtStage};
use log::info;

/// Resets through the ROM software reset.
pub struct EspSystem;

impl SystemControl for EspSystem {
    fn reset(&mut self) {
        info!(" System: software reset");
        esp_hal::system::software_reset();
    }

    fn halt(&mut self) {
        // Tasks stop on their own once the run state is halted; the
        // watchdog task keeps the device from resetting underneath them.
        info!(" System: halted");
    }
}

/// RTC watchdog in its default reset-the-system configuration.
pub struct RtcWatchdog {
    rtc: Rtc<'static>,
}

impl RtcWatchdog {
    pub fn new(mut rtc: Rtc<'static>, timeout_s: u16) -> Self {
        rtc.rwdt.set_timeout(
            RwdtStage::Stage0,
            esp_hal::time::Duration::from_secs(timeout_s.max(1) as u64),
        );
        rtc.rwdt.enable();
        info!(" Watchdog: armed, {}s timeout", timeout_s);
        Self { rtc }
    }
}

impl Watchdog for RtcWatchdog {
    fn feed(&mut self) {
        self.rtc.rwdt.feed();
    }
}
