//! Power domains and their state machines
//!
//! Two domains can be put to sleep independently: the display and the
//! particulate sensor. In mobile mode both follow idle-time thresholds
//! ([`PowerController`]). In station mode the particulate sensor is owned by
//! the periodic [`DutyCycle`] instead, and the idle controller only manages
//! the display. The operating mode decides this once at startup.

mod controller;
mod duty_cycle;
mod session;

pub use controller::{DomainPolicy, PowerController};
pub use duty_cycle::{DutyAction, DutyCycle, DutyCycleConfig, DutyPhase};
pub use session::{SESSION_CLEANUP_INTERVAL, SESSION_TIMEOUT, SessionTracker};

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;
use log::warn;

pub use crate::error::PowerError;

/// Period of the power manager tick.
pub const POWER_TICK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDomain {
    Display,
    ParticulateSensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Awake,
    Asleep,
    /// Particulate sensor only: powered by the station duty cycle.
    DutyCycling {
        period: Duration,
        warmup: Duration,
        on_duration: Duration,
    },
}

/// Hardware enable line for a power domain.
///
/// Implementations must be idempotent; callers only invoke them on
/// transitions.
pub trait PowerSwitch {
    fn enable(&mut self) -> impl Future<Output = Result<(), PowerError>>;
    fn disable(&mut self) -> impl Future<Output = Result<(), PowerError>>;
    fn is_enabled(&self) -> bool;
}

/// Active-high GPIO enable line with an optional active-low reset line.
///
/// The enabled flag only changes after a successful pin write, so a failed
/// write leaves the switch reporting its real level.
pub struct GpioSwitch<P, R = P> {
    domain: PowerDomain,
    enable: P,
    reset: Option<R>,
    enabled: bool,
}

impl<P: OutputPin, R: OutputPin> GpioSwitch<P, R> {
    /// `initially_enabled` is the level the enable pin was configured with.
    pub fn new(domain: PowerDomain, enable: P, reset: Option<R>, initially_enabled: bool) -> Self {
        Self {
            domain,
            enable,
            reset,
            enabled: initially_enabled,
        }
    }

    /// Pulse the reset line low for `pulse`.
    pub async fn reset_pulse(&mut self, pulse: Duration) -> Result<(), PowerError> {
        let domain = self.domain;
        let Some(reset) = self.reset.as_mut() else {
            warn!(" Power: {:?} has no reset line", domain);
            return Ok(());
        };
        let fail = |_| PowerError {
            domain,
            details: "reset line write failed",
        };
        reset.set_low().map_err(fail)?;
        Timer::after(pulse).await;
        reset.set_high().map_err(fail)
    }
}

impl<P: OutputPin, R: OutputPin> PowerSwitch for GpioSwitch<P, R> {
    async fn enable(&mut self) -> Result<(), PowerError> {
        let domain = self.domain;
        self.enable.set_high().map_err(|_| PowerError {
            domain,
            details: "enable line write failed",
        })?;
        self.enabled = true;
        Ok(())
    }

    async fn disable(&mut self) -> Result<(), PowerError> {
        let domain = self.domain;
        self.enable.set_low().map_err(|_| PowerError {
            domain,
            details: "enable line write failed",
        })?;
        self.enabled = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Logical state of each domain, shared with the tasks that must respect it.
///
/// Only the owning power task writes it; the display task skips rendering
/// while the display is asleep and the particulate sampler skips reads while
/// the sensor is unpowered.
pub struct PowerStatus<M: RawMutex> {
    display: Mutex<M, Cell<DomainState>>,
    particulate: Mutex<M, Cell<DomainState>>,
    display_threshold_request: Mutex<M, Cell<Option<u16>>>,
}

impl<M: RawMutex> Default for PowerStatus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> PowerStatus<M> {
    pub const fn new() -> Self {
        Self {
            display: Mutex::new(Cell::new(DomainState::Awake)),
            particulate: Mutex::new(Cell::new(DomainState::Awake)),
            display_threshold_request: Mutex::new(Cell::new(None)),
        }
    }

    pub fn state(&self, domain: PowerDomain) -> DomainState {
        match domain {
            PowerDomain::Display => self.display.lock(Cell::get),
            PowerDomain::ParticulateSensor => self.particulate.lock(Cell::get),
        }
    }

    pub fn is_awake(&self, domain: PowerDomain) -> bool {
        self.state(domain) == DomainState::Awake
    }

    pub(crate) fn set_state(&self, domain: PowerDomain, state: DomainState) {
        match domain {
            PowerDomain::Display => self.display.lock(|s| s.set(state)),
            PowerDomain::ParticulateSensor => self.particulate.lock(|s| s.set(state)),
        }
    }

    /// Ask the power task to apply a new display idle threshold.
    pub fn request_display_threshold(&self, seconds: u16) {
        self.display_threshold_request.lock(|r| r.set(Some(seconds)));
    }

    pub(crate) fn take_display_threshold_request(&self) -> Option<u16> {
        self.display_threshold_request.lock(Cell::take)
    }
}
