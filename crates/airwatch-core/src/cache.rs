//! Shared sensor cache
//!
//! The cache is the only mutable state shared between the sensor tasks
//! (writers) and the display, power and network tasks (readers). Each group
//! has exactly one writer task. A writer stages a complete group value
//! locally, across whatever await points its driver needs, and commits it
//! with [`SensorCache::update`]. The commit runs inside a blocking critical
//! section that never suspends, so a reader can never observe half of a
//! group.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use log::trace;

use crate::sensors::{BatteryReadings, ClimateReadings, ParticulateReadings};

/// Named groups of quantities, each committed as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheGroup {
    Climate,
    Particulate,
    Battery,
}

/// Whether the values in a [`Sample`] came from the most recent acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// Nothing has been committed yet.
    Pending,
    /// The last acquisition succeeded.
    Fresh,
    /// The last acquisition failed; the values are the last known ones.
    Failed,
}

/// A cached group value with its commit time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub values: T,
    pub updated_at: Option<Instant>,
    pub status: SampleStatus,
}

impl<T: Copy> Sample<T> {
    const fn pending(values: T) -> Self {
        Self {
            values,
            updated_at: None,
            status: SampleStatus::Pending,
        }
    }

    /// Values to show on screen; `None` unless the last acquisition succeeded.
    pub fn current(&self) -> Option<T> {
        (self.status == SampleStatus::Fresh).then_some(self.values)
    }

    /// Time since the last commit, successful or not.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.updated_at
            .map(|at| now.saturating_duration_since(at))
    }

    /// Whether the last commit is older than `limit`. A sample that was
    /// never written is not stale, it is pending.
    pub fn is_stale(&self, now: Instant, limit: Duration) -> bool {
        self.age(now).is_some_and(|age| age > limit)
    }

    fn commit(&mut self, values: Option<T>, now: Instant) {
        match values {
            Some(values) => {
                self.values = values;
                self.status = SampleStatus::Fresh;
            }
            None => self.status = SampleStatus::Failed,
        }
        self.updated_at = Some(now);
    }
}

/// Particulate readings plus the AQI derived from PM2.5 at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParticulateState {
    pub readings: ParticulateReadings,
    pub aqi: Option<u16>,
}

impl From<ParticulateReadings> for ParticulateState {
    fn from(readings: ParticulateReadings) -> Self {
        Self {
            readings,
            aqi: aqi_from_pm25(readings.pm25),
        }
    }
}

/// Consistent copy of every group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSnapshot {
    pub climate: Sample<ClimateReadings>,
    pub particulate: Sample<ParticulateState>,
    pub battery: Sample<BatteryReadings>,
}

impl CacheSnapshot {
    const fn empty() -> Self {
        Self {
            climate: Sample::pending(ClimateReadings {
                temperature_c: None,
                humidity_pct: None,
            }),
            particulate: Sample::pending(ParticulateState {
                readings: ParticulateReadings {
                    pm1: None,
                    pm25: None,
                    pm10: None,
                    tvoc_ppb: None,
                    eco2_ppm: None,
                    aqi_tvoc: None,
                    temperature_comp_c: None,
                    humidity_comp_pct: None,
                },
                aqi: None,
            }),
            battery: Sample::pending(BatteryReadings {
                voltage: None,
                percent: None,
            }),
        }
    }
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Age past which each group is shown as out of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleLimits {
    pub climate: Duration,
    pub particulate: Duration,
    pub battery: Duration,
}

impl StaleLimits {
    pub fn for_group(&self, group: CacheGroup) -> Duration {
        match group {
            CacheGroup::Climate => self.climate,
            CacheGroup::Particulate => self.particulate,
            CacheGroup::Battery => self.battery,
        }
    }
}

/// A full-group write; `None` records a failed acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupUpdate {
    Climate(Option<ClimateReadings>),
    Particulate(Option<ParticulateReadings>),
    Battery(Option<BatteryReadings>),
}

impl GroupUpdate {
    pub fn group(&self) -> CacheGroup {
        match self {
            GroupUpdate::Climate(_) => CacheGroup::Climate,
            GroupUpdate::Particulate(_) => CacheGroup::Particulate,
            GroupUpdate::Battery(_) => CacheGroup::Battery,
        }
    }
}

/// A single group read back from the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupSnapshot {
    Climate(Sample<ClimateReadings>),
    Particulate(Sample<ParticulateState>),
    Battery(Sample<BatteryReadings>),
}

impl GroupSnapshot {
    pub fn updated_at(&self) -> Option<Instant> {
        match self {
            GroupSnapshot::Climate(s) => s.updated_at,
            GroupSnapshot::Particulate(s) => s.updated_at,
            GroupSnapshot::Battery(s) => s.updated_at,
        }
    }

    pub fn status(&self) -> SampleStatus {
        match self {
            GroupSnapshot::Climate(s) => s.status,
            GroupSnapshot::Particulate(s) => s.status,
            GroupSnapshot::Battery(s) => s.status,
        }
    }
}

pub struct SensorCache<M: RawMutex> {
    state: Mutex<M, Cell<CacheSnapshot>>,
}

impl<M: RawMutex> Default for SensorCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> SensorCache<M> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(CacheSnapshot::empty())),
        }
    }

    /// Commit a whole group at `now`.
    ///
    /// Passing `None` keeps the previous values, marks the group failed and
    /// still advances its timestamp so staleness can be measured.
    pub fn update(&self, update: GroupUpdate, now: Instant) {
        // Derived values are computed before entering the critical section.
        let staged_particulate = match update {
            GroupUpdate::Particulate(values) => values.map(ParticulateState::from),
            _ => None,
        };

        self.state.lock(|cell| {
            let mut snapshot = cell.get();
            match update {
                GroupUpdate::Climate(values) => snapshot.climate.commit(values, now),
                GroupUpdate::Particulate(_) => snapshot.particulate.commit(staged_particulate, now),
                GroupUpdate::Battery(values) => snapshot.battery.commit(values, now),
            }
            cell.set(snapshot);
        });

        trace!(" Cache: committed {:?}", update.group());
    }

    /// Consistent copy of one group.
    pub fn read(&self, group: CacheGroup) -> GroupSnapshot {
        let snapshot = self.snapshot();
        match group {
            CacheGroup::Climate => GroupSnapshot::Climate(snapshot.climate),
            CacheGroup::Particulate => GroupSnapshot::Particulate(snapshot.particulate),
            CacheGroup::Battery => GroupSnapshot::Battery(snapshot.battery),
        }
    }

    /// Consistent copy of every group.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.state.lock(Cell::get)
    }
}

/// EPA PM2.5 breakpoints: (C_lo, C_hi, I_lo, I_hi).
const PM25_BREAKPOINTS: [(f32, f32, f32, f32); 7] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 350.4, 301.0, 400.0),
    (350.5, 500.4, 401.0, 500.0),
];

/// Air quality index for a PM2.5 concentration in µg/m³.
///
/// Linear within each band, clamped to the band's index range, and 500 for
/// anything above the table.
pub fn aqi_from_pm25(pm25: Option<f32>) -> Option<u16> {
    let c = pm25?;
    if c.is_nan() {
        return None;
    }
    let c = c.max(0.0);

    for (c_lo, c_hi, i_lo, i_hi) in PM25_BREAKPOINTS {
        if c <= c_hi {
            let index = i_lo + (c - c_lo) * (i_hi - i_lo) / (c_hi - c_lo);
            let index = index.clamp(i_lo, i_hi);
            return Some((index + 0.5) as u16);
        }
    }
    Some(500)
}
