//! Wake / activity coordination
//!
//! Input, network sessions and explicit wake requests all report activity
//! here. The last-activity instant only ever moves forward. Every touch also
//! fires a signal so the power task can wake sleeping domains immediately
//! instead of waiting for its next tick.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};

/// Where an activity report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySource {
    Input,
    NetworkSession,
    Wake,
}

pub struct ActivitySignal<M: RawMutex> {
    last: Mutex<M, Cell<Instant>>,
    wake: Signal<M, (Instant, ActivitySource)>,
}

impl<M: RawMutex> ActivitySignal<M> {
    /// Create a signal whose last activity is `start`.
    pub const fn new(start: Instant) -> Self {
        Self {
            last: Mutex::new(Cell::new(start)),
            wake: Signal::new(),
        }
    }

    /// Record activity at `at`.
    ///
    /// Returns the resulting last-activity instant, which is never earlier
    /// than the previous one.
    pub fn touch_at(&self, at: Instant, source: ActivitySource) -> Instant {
        let latest = self.last.lock(|last| {
            let latest = last.get().max(at);
            last.set(latest);
            latest
        });
        self.wake.signal((latest, source));
        latest
    }

    /// Record activity now.
    pub fn touch(&self, source: ActivitySource) -> Instant {
        self.touch_at(Instant::now(), source)
    }

    pub fn last_activity(&self) -> Instant {
        self.last.lock(Cell::get)
    }

    /// Time since the last activity, zero if `now` is earlier.
    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    /// Wait for the next activity report.
    pub async fn wait(&self) -> (Instant, ActivitySource) {
        self.wake.wait().await
    }

    /// Take a pending activity report without waiting.
    pub fn try_take(&self) -> Option<(Instant, ActivitySource)> {
        self.wake.try_take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_touch_is_monotonic() {
        let signal = ActivitySignal::<NoopRawMutex>::new(Instant::from_secs(0));
        signal.touch_at(Instant::from_secs(20), ActivitySource::Input);
        let latest = signal.touch_at(Instant::from_secs(10), ActivitySource::NetworkSession);

        assert_eq!(latest, Instant::from_secs(20));
        assert_eq!(signal.last_activity(), Instant::from_secs(20));
    }

    #[test]
    fn test_idle_time_saturates() {
        let signal = ActivitySignal::<NoopRawMutex>::new(Instant::from_secs(100));
        assert_eq!(signal.idle_time(Instant::from_secs(130)), Duration::from_secs(30));
        assert_eq!(signal.idle_time(Instant::from_secs(50)), Duration::from_secs(0));
    }

    #[test]
    fn test_touch_raises_wake_signal() {
        let signal = ActivitySignal::<NoopRawMutex>::new(Instant::from_secs(0));
        assert!(signal.try_take().is_none());

        signal.touch_at(Instant::from_secs(7), ActivitySource::Wake);
        assert_eq!(
            signal.try_take(),
            Some((Instant::from_secs(7), ActivitySource::Wake))
        );
        assert!(signal.try_take().is_none(), "the wake report is consumed once");
    }
}
