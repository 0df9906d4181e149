//! Network link supervision, time sync and publishing
//!
//! The link itself (WiFi association, DHCP, the UDP/TCP sockets) lives in
//! the firmware behind [`NetworkLink`], [`TimeSync`] and
//! [`NetworkPublisher`]. This module decides when to connect, when to sync
//! the clock, and when publishing is allowed: only while connected and
//! after a successful time sync.

pub mod api;
mod publish;
mod report;
mod supervisor;

pub use publish::{PublishPoint, PublishStats, Topic, publish_points, publish_snapshot};
pub use report::status_report;
pub use supervisor::{Backoff, NetworkSupervisor, SyncPolicy};

use core::cell::Cell;
use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use log::info;

use crate::config::WifiCredentials;
pub use crate::error::NetworkError;

/// Station association and address configuration.
pub trait NetworkLink {
    /// Associate and obtain an address.
    fn connect(
        &mut self,
        credentials: &WifiCredentials,
    ) -> impl Future<Output = Result<Ipv4Addr, NetworkError>>;

    fn is_connected(&self) -> bool;
}

/// Network clock source.
pub trait TimeSync {
    /// Query the current Unix time in seconds.
    fn sync(&mut self) -> impl Future<Output = Result<u64, NetworkError>>;
}

/// Fire-and-forget telemetry sink.
pub trait NetworkPublisher {
    fn publish(&mut self, topic: &str, value: f32) -> impl Future<Output = Result<(), NetworkError>>;
}

/// Snapshot of the link as seen by the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkState {
    pub address: Option<Ipv4Addr>,
    /// Unix seconds at the instant of the last successful sync.
    pub time_base: Option<(u64, Instant)>,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    pub fn is_time_synced(&self) -> bool {
        self.time_base.is_some()
    }

    /// Publishing requires both a link and a synced clock.
    pub fn is_ready(&self) -> bool {
        self.is_connected() && self.is_time_synced()
    }

    pub fn unix_time(&self, now: Instant) -> Option<u64> {
        self.time_base
            .map(|(unix, at)| unix + now.saturating_duration_since(at).as_secs())
    }

    /// Local wall-clock `(hour, minute)` at `now`, shifted by `utc_offset_min`.
    pub fn local_time(&self, now: Instant, utc_offset_min: i16) -> Option<(u8, u8)> {
        let local = self.unix_time(now)? as i64 + utc_offset_min as i64 * 60;
        let minute_of_day = local.rem_euclid(86_400) / 60;
        Some(((minute_of_day / 60) as u8, (minute_of_day % 60) as u8))
    }
}

/// Shared link state, written by the supervisor only.
pub struct NetworkStatus<M: RawMutex> {
    state: Mutex<M, Cell<LinkState>>,
    ready: Signal<M, ()>,
}

impl<M: RawMutex> Default for NetworkStatus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> NetworkStatus<M> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(LinkState {
                address: None,
                time_base: None,
            })),
            ready: Signal::new(),
        }
    }

    pub fn get(&self) -> LinkState {
        self.state.lock(Cell::get)
    }

    fn update(&self, f: impl FnOnce(&mut LinkState)) {
        let (was_ready, is_ready) = self.state.lock(|cell| {
            let mut state = cell.get();
            let was_ready = state.is_ready();
            f(&mut state);
            cell.set(state);
            (was_ready, state.is_ready())
        });
        if is_ready && !was_ready {
            info!(" Network: ready for publishing");
            self.ready.signal(());
        }
    }

    pub(crate) fn set_connected(&self, address: Ipv4Addr) {
        self.update(|state| state.address = Some(address));
    }

    pub(crate) fn set_disconnected(&self) {
        self.update(|state| state.address = None);
    }

    pub(crate) fn set_time(&self, unix: u64, at: Instant) {
        self.update(|state| state.time_base = Some((unix, at)));
    }

    /// Wait until the link is connected and time-synced.
    pub async fn wait_ready(&self) {
        loop {
            if self.get().is_ready() {
                return;
            }
            self.ready.wait().await;
        }
    }
}
