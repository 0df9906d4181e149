//! Station-mode duty cycle for the particulate sensor
//!
//! `Off` (period) -> `Warmup` (sensor powered) -> `Reading` (one acquisition)
//! -> `Settling` (short delay) -> `Off`. Each `Off` phase is anchored at its
//! own start, so the outcome or duration of a read never stretches it.
//! Idle time plays no part here.

use embassy_time::{Duration, Instant};
use log::{debug, info};

use super::DomainState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycleConfig {
    pub period: Duration,
    pub warmup: Duration,
    pub settle: Duration,
}

impl DutyCycleConfig {
    /// How this cycle is reported through the shared power status.
    pub fn domain_state(&self) -> DomainState {
        DomainState::DutyCycling {
            period: self.period,
            warmup: self.warmup,
            on_duration: self.warmup + self.settle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyPhase {
    Off,
    Warmup,
    Reading,
    Settling,
}

/// Hardware work requested by [`DutyCycle::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyAction {
    PowerOn,
    Acquire,
    PowerOff,
}

#[derive(Debug, Clone)]
pub struct DutyCycle {
    config: DutyCycleConfig,
    phase: DutyPhase,
    phase_start: Instant,
    cycles: u32,
}

impl DutyCycle {
    /// Start in `Off` at `now`; the first power-on is one period later.
    pub fn new(config: DutyCycleConfig, now: Instant) -> Self {
        Self {
            config,
            phase: DutyPhase::Off,
            phase_start: now,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> DutyPhase {
        self.phase
    }

    pub fn config(&self) -> &DutyCycleConfig {
        &self.config
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// When the current phase ends, or `None` while waiting for a read to
    /// finish.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            DutyPhase::Off => Some(self.phase_start + self.config.period),
            DutyPhase::Warmup => Some(self.phase_start + self.config.warmup),
            DutyPhase::Reading => None,
            DutyPhase::Settling => Some(self.phase_start + self.config.settle),
        }
    }

    /// Advance if the current phase has expired.
    ///
    /// `Acquire` is returned exactly once per cycle; the caller reports back
    /// with [`DutyCycle::finish_reading`].
    pub fn poll(&mut self, now: Instant) -> Option<DutyAction> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        let (next, action) = match self.phase {
            DutyPhase::Off => (DutyPhase::Warmup, DutyAction::PowerOn),
            DutyPhase::Warmup => (DutyPhase::Reading, DutyAction::Acquire),
            DutyPhase::Settling => (DutyPhase::Off, DutyAction::PowerOff),
            DutyPhase::Reading => return None,
        };

        if next == DutyPhase::Off {
            self.cycles = self.cycles.wrapping_add(1);
            info!(
                " Station: particulate sensor off for {}s",
                self.config.period.as_secs()
            );
        }
        debug!(" Station: {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.phase_start = now;
        Some(action)
    }

    /// The one-shot acquisition is over, successful or not.
    pub fn finish_reading(&mut self, now: Instant, succeeded: bool) {
        if self.phase != DutyPhase::Reading {
            return;
        }
        if !succeeded {
            info!(" Station: acquisition failed, cycle continues");
        }
        self.phase = DutyPhase::Settling;
        self.phase_start = now;
    }
}
