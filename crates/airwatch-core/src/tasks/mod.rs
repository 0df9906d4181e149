//! Task bodies and the startup task roster
//!
//! Every long-lived task is a plain generic `async fn` here; the firmware and
//! the simulator wrap them in their executor's task macro with concrete
//! types. Tasks talk to each other only through [`Monitor`]. Each loop checks
//! [`Monitor::is_running`] so the whole set winds down after the debug menu's
//! exit, and logs and carries on after any per-iteration error.
//!
//! [`Monitor`]: crate::app_state::Monitor
//! [`Monitor::is_running`]: crate::app_state::Monitor::is_running

mod dispatch;
mod network;
mod power;
mod sampling;
mod ui;

pub use dispatch::{ActionDispatcher, SystemControl};
pub use network::{run_network, run_publisher, serve_request};
pub use power::{power_step, run_power};
pub use sampling::{Sampler, StationCycle, run_duty_cycle, run_sampler};
pub use ui::{DisplayLoop, handle_input, run_display, run_input};

use embassy_time::{Duration, Timer};
use log::info;

use crate::config::{OperatingMode, Settings};

/// Hardware watchdog fed by [`run_watchdog`].
pub trait Watchdog {
    fn feed(&mut self);
}

/// How often the watchdog is fed; well inside its timeout.
pub const WATCHDOG_FEED_INTERVAL: Duration = Duration::from_secs(5);

/// Feed the watchdog for as long as the executor keeps polling us.
///
/// This keeps running after a halt, so the exit screen stays up instead of
/// the device resetting.
pub async fn run_watchdog<W: Watchdog>(watchdog: &mut W, interval: Duration) -> ! {
    info!(" Watchdog: feeding every {}s", interval.as_secs());
    loop {
        watchdog.feed();
        Timer::after(interval).await;
    }
}

/// Peripherals detected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Peripherals {
    pub climate: bool,
    pub particulate: bool,
    pub battery: bool,
}

/// Which task owns the particulate sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticulateOwner {
    Absent,
    /// Mobile mode: periodic sampler, idle-managed power.
    Sampler,
    /// Station mode: the duty cycle powers, reads and sleeps it.
    DutyCycle,
}

/// The fixed task set for this boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPlan {
    pub climate: bool,
    pub particulate: ParticulateOwner,
    pub battery: bool,
    pub network: bool,
    pub publisher: bool,
}

impl TaskPlan {
    pub fn decide(
        settings: &Settings,
        mode: OperatingMode,
        peripherals: Peripherals,
        wifi_configured: bool,
    ) -> Self {
        let particulate = match (peripherals.particulate, mode) {
            (false, _) => ParticulateOwner::Absent,
            (true, OperatingMode::Mobile) => ParticulateOwner::Sampler,
            (true, OperatingMode::Station) => ParticulateOwner::DutyCycle,
        };
        let network = settings.network_enabled && wifi_configured;

        let plan = Self {
            climate: peripherals.climate,
            particulate,
            battery: peripherals.battery,
            network,
            publisher: network && settings.publish_enabled,
        };
        info!(" Tasks: {:?} mode, {:?}", mode, plan);
        plan
    }

    /// Whether the idle power controller gets the particulate switch.
    pub fn idle_manages_particulate(&self) -> bool {
        self.particulate == ParticulateOwner::Sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: Peripherals = Peripherals {
        climate: true,
        particulate: true,
        battery: true,
    };

    #[test]
    fn test_mode_picks_particulate_owner() {
        let settings = Settings::default();
        let mobile = TaskPlan::decide(&settings, OperatingMode::Mobile, ALL, true);
        assert_eq!(mobile.particulate, ParticulateOwner::Sampler);
        assert!(mobile.idle_manages_particulate());

        let station = TaskPlan::decide(&settings, OperatingMode::Station, ALL, true);
        assert_eq!(station.particulate, ParticulateOwner::DutyCycle);
        assert!(!station.idle_manages_particulate(), "never both at once");
    }

    #[test]
    fn test_missing_sensor_gets_no_task() {
        let settings = Settings::default();
        let plan = TaskPlan::decide(
            &settings,
            OperatingMode::Station,
            Peripherals {
                particulate: false,
                ..ALL
            },
            true,
        );
        assert_eq!(plan.particulate, ParticulateOwner::Absent);
        assert!(plan.climate);
    }

    #[test]
    fn test_network_tasks_need_credentials_and_toggles() {
        let mut settings = Settings::default();
        let plan = TaskPlan::decide(&settings, OperatingMode::Mobile, ALL, false);
        assert!(!plan.network && !plan.publisher);

        settings.publish_enabled = false;
        let plan = TaskPlan::decide(&settings, OperatingMode::Mobile, ALL, true);
        assert!(plan.network);
        assert!(!plan.publisher);

        settings.network_enabled = false;
        settings.publish_enabled = true;
        let plan = TaskPlan::decide(&settings, OperatingMode::Mobile, ALL, true);
        assert!(!plan.publisher, "publishing needs the network task");
    }
}
