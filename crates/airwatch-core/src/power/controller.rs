//! Idle-time driven sleep for the display and particulate sensor

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use log::{debug, error, info, warn};

use super::{DomainState, PowerDomain, PowerStatus, PowerSwitch};

/// Sleep policy for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainPolicy {
    /// Idle seconds before sleeping; `0` means never sleep.
    pub threshold_s: u16,
    /// Whether an external presence (an active network session) holds the
    /// domain awake.
    pub honours_presence: bool,
}

impl DomainPolicy {
    pub const fn new(threshold_s: u16) -> Self {
        Self {
            threshold_s,
            honours_presence: true,
        }
    }
}

struct ManagedDomain<S> {
    domain: PowerDomain,
    switch: S,
    policy: DomainPolicy,
    state: DomainState,
}

impl<S: PowerSwitch> ManagedDomain<S> {
    /// The state this domain should be in at the given idle time.
    fn target(&self, idle: Duration, presence: bool) -> DomainState {
        let threshold = Duration::from_secs(self.policy.threshold_s as u64);
        let held = presence && self.policy.honours_presence;
        let sleeps = self.policy.threshold_s > 0;

        match self.state {
            DomainState::Awake if sleeps && idle > threshold && !held => DomainState::Asleep,
            DomainState::Asleep if !sleeps || idle <= threshold || held => DomainState::Awake,
            state => state,
        }
    }

    async fn transition(&mut self, target: DomainState) {
        let result = match target {
            DomainState::Awake => self.switch.enable().await,
            _ => self.switch.disable().await,
        };
        if let Err(e) = result {
            // Advance anyway; the next tick sees the mismatch and retries.
            error!(" Power: {}", e);
        }
        info!(" Power: {:?} {:?} -> {:?}", self.domain, self.state, target);
        self.state = target;
    }

    /// Re-issue the hardware call if an earlier one failed.
    async fn reconcile(&mut self) {
        let should_be_on = self.state == DomainState::Awake;
        if self.switch.is_enabled() == should_be_on {
            return;
        }
        warn!(
            " Power: {:?} switch disagrees with state {:?}, retrying",
            self.domain, self.state
        );
        let result = if should_be_on {
            self.switch.enable().await
        } else {
            self.switch.disable().await
        };
        if let Err(e) = result {
            error!(" Power: {}", e);
        }
    }

    async fn step(&mut self, idle: Duration, presence: bool) -> bool {
        let target = self.target(idle, presence);
        if target != self.state {
            self.transition(target).await;
            true
        } else {
            self.reconcile().await;
            false
        }
    }
}

/// Owner of the idle-managed power domains.
///
/// The display is always managed here. The particulate sensor is managed
/// here only in mobile mode; in station mode it belongs to the duty cycle
/// and is passed as `None`.
pub struct PowerController<'a, M: RawMutex, D, P> {
    status: &'a PowerStatus<M>,
    display: ManagedDomain<D>,
    particulate: Option<ManagedDomain<P>>,
}

impl<'a, M, D, P> PowerController<'a, M, D, P>
where
    M: RawMutex,
    D: PowerSwitch,
    P: PowerSwitch,
{
    pub fn new(
        status: &'a PowerStatus<M>,
        display: D,
        display_policy: DomainPolicy,
        particulate: Option<(P, DomainPolicy)>,
    ) -> Self {
        status.set_state(PowerDomain::Display, DomainState::Awake);
        let particulate = particulate.map(|(switch, policy)| {
            status.set_state(PowerDomain::ParticulateSensor, DomainState::Awake);
            ManagedDomain {
                domain: PowerDomain::ParticulateSensor,
                switch,
                policy,
                state: DomainState::Awake,
            }
        });

        Self {
            status,
            display: ManagedDomain {
                domain: PowerDomain::Display,
                switch: display,
                policy: display_policy,
                state: DomainState::Awake,
            },
            particulate,
        }
    }

    pub fn state(&self, domain: PowerDomain) -> Option<DomainState> {
        match domain {
            PowerDomain::Display => Some(self.display.state),
            PowerDomain::ParticulateSensor => self.particulate.as_ref().map(|d| d.state),
        }
    }

    pub fn set_threshold(&mut self, domain: PowerDomain, threshold_s: u16) {
        let managed = match domain {
            PowerDomain::Display => Some(&mut self.display.policy),
            PowerDomain::ParticulateSensor => self.particulate.as_mut().map(|d| &mut d.policy),
        };
        if let Some(policy) = managed {
            info!(" Power: {:?} idle threshold set to {}s", domain, threshold_s);
            policy.threshold_s = threshold_s;
        }
    }

    /// Evaluate every managed domain.
    ///
    /// Transitions are edge-triggered: a domain's switch is only called when
    /// its logical state changes, or when the switch disagrees with it after
    /// an earlier failure.
    pub async fn tick(&mut self, now: Instant, last_activity: Instant, presence: bool) {
        if let Some(seconds) = self.status.take_display_threshold_request() {
            self.set_threshold(PowerDomain::Display, seconds);
        }

        let idle = now.saturating_duration_since(last_activity);
        debug!(" Power: tick, idle {}s presence {}", idle.as_secs(), presence);

        if self.display.step(idle, presence).await {
            self.status.set_state(PowerDomain::Display, self.display.state);
        }
        if let Some(particulate) = self.particulate.as_mut()
            && particulate.step(idle, presence).await
        {
            self.status
                .set_state(PowerDomain::ParticulateSensor, particulate.state);
        }
    }

    /// Wake every sleeping domain right away.
    pub async fn on_activity(&mut self) {
        if self.display.state == DomainState::Asleep {
            self.display.transition(DomainState::Awake).await;
            self.status.set_state(PowerDomain::Display, DomainState::Awake);
        }
        if let Some(particulate) = self.particulate.as_mut()
            && particulate.state == DomainState::Asleep
        {
            particulate.transition(DomainState::Awake).await;
            self.status
                .set_state(PowerDomain::ParticulateSensor, DomainState::Awake);
        }
    }
}
