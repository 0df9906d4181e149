//! Network supervision, publishing and the status server

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};
use log::{debug, info};

use crate::activity::ActivitySource;
use crate::app_state::Monitor;
use crate::network::api::{AckPayload, DataPayload, Response, Route, StatusPayload};
use crate::network::{
    NetworkLink, NetworkPublisher, NetworkSupervisor, PublishStats, TimeSync, publish_snapshot,
    status_report,
};
use crate::power::PowerDomain;

/// Keep the link up and the clock synced.
pub async fn run_network<M, L, T>(monitor: &Monitor<M>, mut supervisor: NetworkSupervisor<'_, M, L, T>)
where
    M: RawMutex,
    L: NetworkLink,
    T: TimeSync,
{
    info!(" Network: supervisor started");
    while monitor.is_running() {
        let wait = supervisor.step(Instant::now()).await;
        Timer::after(wait).await;
    }
}

/// Publish the cache every `interval` once the link is connected and
/// time-synced. Rounds are skipped while either prerequisite is missing.
pub async fn run_publisher<M, P>(monitor: &Monitor<M>, publisher: &mut P, interval: Duration)
where
    M: RawMutex,
    P: NetworkPublisher,
{
    monitor.network.wait_ready().await;
    info!(" Publish: every {}s", interval.as_secs());

    let mut stats = PublishStats::default();
    while monitor.is_running() {
        if monitor.network.get().is_ready() {
            publish_snapshot(publisher, &monitor.cache.snapshot(), &mut stats).await;
        } else {
            debug!(" Publish: link not ready, round skipped");
        }
        Timer::after(interval).await;
    }
}

/// Answer one HTTP request from `client`.
///
/// Every request registers a session for the client, so a page polling
/// `/api/heartbeat` holds both power domains awake.
pub fn serve_request<M: RawMutex>(monitor: &Monitor<M>, request: &[u8], client: u32, now: Instant) -> Response {
    monitor.sessions.register_access(client, now, &monitor.activity);
    let route = Route::parse(request);
    debug!(" Status: {:?} from {:08x}", route, client);

    let display = monitor.power.state(PowerDomain::Display);
    let particulate = monitor.power.state(PowerDomain::ParticulateSensor);
    match route {
        Route::Page => {
            let page = status_report(
                &monitor.cache.snapshot(),
                &monitor.network.get(),
                monitor.menu_view().mode,
                display,
                particulate,
                now,
            );
            Response::text(200, &page)
        }
        Route::Data => Response::json(&DataPayload::new(&monitor.cache.snapshot(), now)),
        Route::Status => Response::json(&StatusPayload::new(
            &monitor.network.get(),
            monitor.menu_view().mode,
            display,
            particulate,
            monitor.sessions.len(),
            now,
        )),
        Route::Heartbeat => Response::json(&AckPayload::ok(monitor.sessions.len(), now)),
        Route::Wake => {
            monitor.activity.touch_at(now, ActivitySource::Wake);
            info!(" Status: remote wake from {:08x}", client);
            Response::json(&AckPayload::ok(monitor.sessions.len(), now))
        }
        Route::NotFound => Response::text(404, "Not Found"),
        Route::BadRequest => Response::text(400, "Bad Request"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeState;
    use alloc::string::String;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn monitor() -> Monitor<NoopRawMutex> {
        let monitor = Monitor::new(&RuntimeState::default(), Instant::from_secs(0));
        monitor.activity.try_take();
        monitor
    }

    fn body(response: &Response) -> String {
        String::from_utf8(response.body.clone()).unwrap()
    }

    #[test]
    fn test_page_registers_session() {
        let monitor = monitor();
        let response = serve_request(&monitor, b"GET / HTTP/1.1\r\n\r\n", 0x0a00_0002, Instant::from_secs(40));

        assert_eq!(response.status, 200);
        assert!(body(&response).contains("mode: Mobile"));
        assert!(monitor.sessions.has_active(Instant::from_secs(40)));
        assert_eq!(
            monitor.activity.try_take(),
            Some((Instant::from_secs(40), ActivitySource::NetworkSession))
        );
    }

    #[test]
    fn test_heartbeat_keeps_session_alive() {
        let monitor = monitor();
        let client = 0x0a00_0003;
        serve_request(&monitor, b"GET / HTTP/1.1\r\n", client, Instant::from_secs(0));

        let heartbeat = b"GET /api/heartbeat HTTP/1.1\r\n";
        let response = serve_request(&monitor, heartbeat, client, Instant::from_secs(250));
        assert!(body(&response).contains("\"active_sessions\":1"));

        // 300 s after the first access but only 150 s after the heartbeat.
        assert!(monitor.sessions.has_active(Instant::from_secs(400)));
        assert_eq!(monitor.sessions.prune(Instant::from_secs(400)), 0);
        assert!(!monitor.sessions.has_active(Instant::from_secs(551)));
    }

    #[test]
    fn test_wake_raises_wake_activity() {
        let monitor = monitor();
        let response = serve_request(&monitor, b"GET /api/wake HTTP/1.1\r\n", 1, Instant::from_secs(70));

        assert_eq!(response.status, 200);
        assert_eq!(monitor.activity.last_activity(), Instant::from_secs(70));
        assert_eq!(
            monitor.activity.try_take(),
            Some((Instant::from_secs(70), ActivitySource::Wake))
        );
    }

    #[test]
    fn test_data_and_unknown_routes() {
        let monitor = monitor();
        let data = serve_request(&monitor, b"GET /api/data HTTP/1.1\r\n", 1, Instant::from_secs(5));
        assert_eq!(data.content_type, crate::network::api::JSON);
        assert!(body(&data).contains("\"pm25\":null"));

        let missing = serve_request(&monitor, b"GET /nope HTTP/1.1\r\n", 1, Instant::from_secs(5));
        assert_eq!(missing.status, 404);
        let bad = serve_request(&monitor, b"\r\n", 1, Instant::from_secs(5));
        assert_eq!(bad.status, 400);
    }
}
