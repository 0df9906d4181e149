//! Sensor sampling and the station-mode duty cycle

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};
use log::{error, info, warn};

use crate::app_state::Monitor;
use crate::cache::GroupUpdate;
use crate::power::{DutyAction, DutyCycle, DutyCycleConfig, POWER_TICK, PowerDomain, PowerSwitch};
use crate::sensors::{Acquisition, ParticulateReadings, Sensor, acquire};

/// One sensor bound to the cache group it writes.
pub struct Sampler<S: Sensor> {
    sensor: Option<S>,
    timeout: Duration,
    commit: fn(Option<S::Readings>) -> GroupUpdate,
    gate: Option<PowerDomain>,
}

impl<S: Sensor> Sampler<S> {
    /// `commit` wraps a reading, or a failure, into its group update,
    /// e.g. `GroupUpdate::Climate`.
    pub fn new(
        sensor: Option<S>,
        timeout: Duration,
        commit: fn(Option<S::Readings>) -> GroupUpdate,
    ) -> Self {
        Self {
            sensor,
            timeout,
            commit,
            gate: None,
        }
    }

    /// Skip reads while `domain` is not awake.
    pub fn gated(mut self, domain: PowerDomain) -> Self {
        self.gate = Some(domain);
        self
    }

    pub fn is_present(&self) -> bool {
        self.sensor.is_some()
    }

    /// Read once and commit the whole group. Returns `None` when the read
    /// was skipped because the sensor is unpowered.
    pub async fn sample<M: RawMutex>(
        &mut self,
        monitor: &Monitor<M>,
    ) -> Option<Acquisition<S::Readings>> {
        if let Some(domain) = self.gate
            && !monitor.power.is_awake(domain)
        {
            return None;
        }

        let acquisition = acquire(self.sensor.as_mut(), self.timeout).await;
        if let Acquisition::Failed(e) = &acquisition {
            warn!(" {}: {}", S::NAME, e);
        }
        monitor
            .cache
            .update((self.commit)(acquisition.clone().into_values()), Instant::now());
        Some(acquisition)
    }
}

/// Periodic acquisition loop for one cache group.
pub async fn run_sampler<M, S>(monitor: &Monitor<M>, mut sampler: Sampler<S>, interval: Duration)
where
    M: RawMutex,
    S: Sensor,
{
    if !sampler.is_present() {
        info!(" {}: not present, sampler not started", S::NAME);
        return;
    }
    info!(" {}: sampling every {}s", S::NAME, interval.as_secs());

    while monitor.is_running() {
        sampler.sample(monitor).await;
        Timer::after(interval).await;
    }
}

/// The particulate sensor under station-mode ownership: its switch, the
/// sensor and the cycle that schedules both.
pub struct StationCycle<S, P> {
    cycle: DutyCycle,
    sensor: S,
    switch: P,
    timeout: Duration,
}

impl<S, P> StationCycle<S, P>
where
    S: Sensor<Readings = ParticulateReadings>,
    P: PowerSwitch,
{
    pub fn new(config: DutyCycleConfig, sensor: S, switch: P, timeout: Duration, now: Instant) -> Self {
        Self {
            cycle: DutyCycle::new(config, now),
            sensor,
            switch,
            timeout,
        }
    }

    pub fn cycle(&self) -> &DutyCycle {
        &self.cycle
    }

    /// Power the sensor down and publish the duty-cycling state.
    pub async fn start<M: RawMutex>(&mut self, monitor: &Monitor<M>) {
        if let Err(e) = self.switch.disable().await {
            error!(" Station: {}", e);
        }
        monitor.power.set_state(
            PowerDomain::ParticulateSensor,
            self.cycle.config().domain_state(),
        );
        info!(
            " Station: particulate sensor off, first reading in {}s",
            self.cycle.config().period.as_secs()
        );
    }

    /// Carry out whatever the cycle asks for at `now`.
    pub async fn advance<M: RawMutex>(&mut self, monitor: &Monitor<M>, now: Instant) -> Option<DutyAction> {
        let action = self.cycle.poll(now)?;
        match action {
            DutyAction::PowerOn => {
                info!(
                    " Station: particulate sensor on, warming up {}s",
                    self.cycle.config().warmup.as_secs()
                );
                if let Err(e) = self.switch.enable().await {
                    error!(" Station: {}", e);
                }
            }
            DutyAction::Acquire => {
                let acquisition = acquire(Some(&mut self.sensor), self.timeout).await;
                let succeeded = acquisition.is_ok();
                if let Acquisition::Failed(e) = &acquisition {
                    warn!(" Station: {}", e);
                }
                let done = Instant::now().max(now);
                monitor
                    .cache
                    .update(GroupUpdate::Particulate(acquisition.into_values()), done);
                self.cycle.finish_reading(done, succeeded);
            }
            DutyAction::PowerOff => {
                if let Err(e) = self.switch.disable().await {
                    error!(" Station: {}", e);
                }
            }
        }
        Some(action)
    }
}

/// Station-mode loop: sleep until each phase deadline and advance.
pub async fn run_duty_cycle<M, S, P>(monitor: &Monitor<M>, mut station: StationCycle<S, P>)
where
    M: RawMutex,
    S: Sensor<Readings = ParticulateReadings>,
    P: PowerSwitch,
{
    station.start(monitor).await;
    while monitor.is_running() {
        station.advance(monitor, Instant::now()).await;
        match station.cycle().deadline() {
            Some(deadline) => Timer::at(deadline).await,
            None => Timer::after(POWER_TICK).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SampleStatus;
    use crate::config::RuntimeState;
    use crate::power::{DomainState, DutyPhase, PowerError};
    use crate::sensors::{ClimateReadings, SensorError};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    struct FakeClimate {
        fail: bool,
    }

    impl Sensor for FakeClimate {
        type Readings = ClimateReadings;
        const NAME: &'static str = "FAKE";

        async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
            if self.fail {
                return Err(SensorError::ReadFailed {
                    sensor: Self::NAME,
                    operation: "measure",
                    details: "nack",
                });
            }
            Ok(ClimateReadings {
                temperature_c: Some(21.0),
                humidity_pct: Some(40.0),
            })
        }
    }

    struct FakeParticulate {
        fail: bool,
        reads: u32,
    }

    impl Sensor for FakeParticulate {
        type Readings = ParticulateReadings;
        const NAME: &'static str = "FAKE-PM";

        async fn read(&mut self) -> Result<ParticulateReadings, SensorError> {
            self.reads += 1;
            if self.fail {
                return Err(SensorError::InvalidData {
                    sensor: Self::NAME,
                    details: "checksum",
                });
            }
            Ok(ParticulateReadings {
                pm25: Some(12.0),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct Switch {
        on: bool,
        toggles: u32,
    }

    impl PowerSwitch for Switch {
        async fn enable(&mut self) -> Result<(), PowerError> {
            self.on = true;
            self.toggles += 1;
            Ok(())
        }

        async fn disable(&mut self) -> Result<(), PowerError> {
            self.on = false;
            self.toggles += 1;
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.on
        }
    }

    fn monitor() -> Monitor<NoopRawMutex> {
        Monitor::new(&RuntimeState::default(), Instant::from_secs(0))
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_sample_commits_group() {
        let monitor = monitor();
        let mut sampler = Sampler::new(Some(FakeClimate { fail: false }), TIMEOUT, GroupUpdate::Climate);

        assert!(block_on(sampler.sample(&monitor)).is_some_and(|a| a.is_ok()));
        let climate = monitor.cache.snapshot().climate;
        assert_eq!(climate.status, SampleStatus::Fresh);
        assert_eq!(climate.values.temperature_c, Some(21.0));
    }

    #[test]
    fn test_failed_sample_is_recorded_not_fatal() {
        let monitor = monitor();
        let mut sampler = Sampler::new(Some(FakeClimate { fail: false }), TIMEOUT, GroupUpdate::Climate);
        block_on(sampler.sample(&monitor));

        sampler.sensor = Some(FakeClimate { fail: true });
        let outcome = block_on(sampler.sample(&monitor));
        assert!(matches!(outcome, Some(Acquisition::Failed(_))));

        let climate = monitor.cache.snapshot().climate;
        assert_eq!(climate.status, SampleStatus::Failed);
        assert_eq!(climate.current(), None);
        assert_eq!(climate.values.temperature_c, Some(21.0), "last known values kept");
    }

    #[test]
    fn test_gated_sampler_skips_sleeping_domain() {
        let monitor = monitor();
        let mut sampler = Sampler::new(
            Some(FakeParticulate { fail: false, reads: 0 }),
            TIMEOUT,
            GroupUpdate::Particulate,
        )
        .gated(PowerDomain::ParticulateSensor);

        monitor
            .power
            .set_state(PowerDomain::ParticulateSensor, DomainState::Asleep);
        assert!(block_on(sampler.sample(&monitor)).is_none());
        assert_eq!(sampler.sensor.as_ref().map(|s| s.reads), Some(0));

        monitor
            .power
            .set_state(PowerDomain::ParticulateSensor, DomainState::Awake);
        assert!(block_on(sampler.sample(&monitor)).is_some());
        assert_eq!(monitor.cache.snapshot().particulate.values.aqi, Some(50));
    }

    #[test]
    fn test_station_cycle_runs_one_reading_per_period() {
        let monitor = monitor();
        let config = DutyCycleConfig {
            period: Duration::from_secs(300),
            warmup: Duration::from_secs(60),
            settle: Duration::from_millis(500),
        };
        let start = Instant::from_secs(10);
        let mut station = StationCycle::new(
            config,
            FakeParticulate { fail: true, reads: 0 },
            Switch { on: true, toggles: 0 },
            TIMEOUT,
            start,
        );

        block_on(station.start(&monitor));
        assert!(!station.switch.on);
        assert_eq!(
            monitor.power.state(PowerDomain::ParticulateSensor),
            config.domain_state()
        );

        assert_eq!(block_on(station.advance(&monitor, start + Duration::from_secs(299))), None);
        let on_at = start + Duration::from_secs(300);
        assert_eq!(block_on(station.advance(&monitor, on_at)), Some(DutyAction::PowerOn));
        assert!(station.switch.on);

        let read_at = on_at + Duration::from_secs(60);
        assert_eq!(block_on(station.advance(&monitor, read_at)), Some(DutyAction::Acquire));
        assert_eq!(station.sensor.reads, 1);
        assert_eq!(station.cycle().phase(), DutyPhase::Settling, "failure completes the cycle");
        assert_eq!(monitor.cache.snapshot().particulate.status, SampleStatus::Failed);

        let off_at = read_at + Duration::from_millis(500);
        assert_eq!(block_on(station.advance(&monitor, off_at)), Some(DutyAction::PowerOff));
        assert!(!station.switch.on);
        assert_eq!(station.cycle().deadline(), Some(off_at + config.period));
    }
}
