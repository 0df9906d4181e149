//! Power manager task

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use log::{debug, info};

use crate::app_state::Monitor;
use crate::power::{POWER_TICK, PowerController, PowerSwitch, SESSION_CLEANUP_INTERVAL};

/// One evaluation: prune expired sessions when due, then tick the
/// controller with the current presence override.
pub async fn power_step<M, D, P>(
    monitor: &Monitor<M>,
    controller: &mut PowerController<'_, M, D, P>,
    now: Instant,
    last_prune: &mut Instant,
) where
    M: RawMutex,
    D: PowerSwitch,
    P: PowerSwitch,
{
    if now.saturating_duration_since(*last_prune) >= SESSION_CLEANUP_INTERVAL {
        monitor.sessions.prune(now);
        *last_prune = now;
    }
    let presence = monitor.sessions.has_active(now);
    controller
        .tick(now, monitor.activity.last_activity(), presence)
        .await;
}

/// Tick every [`POWER_TICK`], and wake sleeping domains as soon as activity
/// is reported rather than on the next tick.
pub async fn run_power<M, D, P>(monitor: &Monitor<M>, mut controller: PowerController<'_, M, D, P>)
where
    M: RawMutex,
    D: PowerSwitch,
    P: PowerSwitch,
{
    info!(" Power: manager started, tick {}s", POWER_TICK.as_secs());
    let mut last_prune = Instant::now();

    while monitor.is_running() {
        if let Either::Second((at, source)) =
            select(Timer::after(POWER_TICK), monitor.activity.wait()).await
        {
            debug!(" Power: activity from {:?} at {}ms", source, at.as_millis());
            controller.on_activity().await;
        }
        power_step(monitor, &mut controller, Instant::now(), &mut last_prune).await;
    }
}
