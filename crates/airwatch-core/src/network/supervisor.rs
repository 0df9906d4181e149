//! Connection and time-sync supervision

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer, with_timeout};
use log::{debug, error, info, warn};

use super::{NetworkLink, NetworkStatus, TimeSync};
use crate::config::WifiCredentials;
use crate::error::NetworkError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// How often the supervisor re-checks a healthy link.
const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed-interval retry schedule.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    interval: Duration,
    next_attempt: Option<Instant>,
    failures: u32,
}

impl Backoff {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_attempt: None,
            failures: 0,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_attempt.is_none_or(|at| now >= at)
    }

    /// Time until the next attempt is allowed.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_attempt
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::from_ticks(0))
    }

    pub fn failed(&mut self, now: Instant) {
        self.failures = self.failures.saturating_add(1);
        self.next_attempt = Some(now + self.interval);
    }

    pub fn succeeded(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub attempts: u8,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub resync_interval: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            resync_interval: Duration::from_secs(3600),
        }
    }
}

/// Keeps the link up and the clock synced.
///
/// Owns the link and the clock source; every other task sees the result
/// through [`NetworkStatus`].
pub struct NetworkSupervisor<'a, M: RawMutex, L, T> {
    status: &'a NetworkStatus<M>,
    link: L,
    clock: T,
    credentials: WifiCredentials,
    policy: SyncPolicy,
    connect_backoff: Backoff,
    sync_backoff: Backoff,
    last_sync: Option<Instant>,
    was_connected: bool,
}

impl<'a, M, L, T> NetworkSupervisor<'a, M, L, T>
where
    M: RawMutex,
    L: NetworkLink,
    T: TimeSync,
{
    pub fn new(
        status: &'a NetworkStatus<M>,
        link: L,
        clock: T,
        credentials: WifiCredentials,
        policy: SyncPolicy,
    ) -> Self {
        let retry = credentials.retry_interval();
        Self {
            status,
            link,
            clock,
            credentials,
            policy,
            connect_backoff: Backoff::new(retry),
            sync_backoff: Backoff::new(retry),
            last_sync: None,
            was_connected: false,
        }
    }

    async fn connect(&mut self) -> Result<(), NetworkError> {
        info!(
            " Network: connecting to '{}' (attempt {})",
            self.credentials.ssid,
            self.connect_backoff.failures() + 1
        );
        let address = with_timeout(CONNECT_TIMEOUT, self.link.connect(&self.credentials))
            .await
            .map_err(|_| NetworkError::Timeout {
                operation: "connect",
            })??;

        info!(" Network: connected, address {}", address);
        self.status.set_connected(address);
        self.connect_backoff.succeeded();
        self.was_connected = true;
        Ok(())
    }

    async fn sync_time(&mut self) -> Result<u64, NetworkError> {
        let mut last_error = NetworkError::NotReady;
        for attempt in 1..=self.policy.attempts {
            match with_timeout(self.policy.timeout, self.clock.sync()).await {
                Ok(Ok(unix)) => return Ok(unix),
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = NetworkError::Timeout {
                        operation: "time sync",
                    }
                }
            }
            warn!(
                " Network: time sync attempt {}/{} failed: {}",
                attempt, self.policy.attempts, last_error
            );
            if attempt < self.policy.attempts {
                Timer::after(self.policy.retry_delay).await;
            }
        }
        Err(last_error)
    }

    fn sync_due(&self, now: Instant) -> bool {
        let stale = self
            .last_sync
            .is_none_or(|at| now.saturating_duration_since(at) >= self.policy.resync_interval);
        stale && self.sync_backoff.is_due(now)
    }

    /// One supervision pass. Returns how long to wait before the next one.
    pub async fn step(&mut self, now: Instant) -> Duration {
        if !self.credentials.is_configured() {
            debug!(" Network: no credentials configured");
            return self.credentials.retry_interval();
        }

        if !self.link.is_connected() {
            if self.was_connected {
                warn!(" Network: link lost");
                self.status.set_disconnected();
                self.was_connected = false;
            }
            if !self.connect_backoff.is_due(now) {
                return self.connect_backoff.remaining(now);
            }
            if let Err(e) = self.connect().await {
                error!(" Network: {}", e);
                self.connect_backoff.failed(now);
                return self.connect_backoff.remaining(now);
            }
        }

        if self.sync_due(now) {
            match self.sync_time().await {
                Ok(unix) => {
                    info!(" Network: time synced, unix {}", unix);
                    self.status.set_time(unix, Instant::now());
                    self.last_sync = Some(now);
                    self.sync_backoff.succeeded();
                }
                Err(e) => {
                    error!(" Network: time sync gave up: {}", e);
                    self.sync_backoff.failed(now);
                }
            }
        }

        CHECK_INTERVAL
    }
}
