//! Routes served by the on-device HTTP status server
//!
//! Only the request line is looked at. `/` gets the plain-text report, the
//! `/api/*` routes answer with JSON built from a cache snapshot.

use alloc::vec::Vec;
use core::fmt::Write;

use embassy_time::Instant;
use log::warn;
use serde::Serialize;

use super::LinkState;
use crate::cache::{CacheSnapshot, Sample};
use crate::config::OperatingMode;
use crate::power::DomainState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Plain-text status page.
    Page,
    /// Cached sensor values.
    Data,
    /// Link, power and session state.
    Status,
    /// Keeps the caller's session alive.
    Heartbeat,
    /// Wakes every sleeping domain.
    Wake,
    NotFound,
    BadRequest,
}

impl Route {
    /// Route a raw request by the path in its request line.
    pub fn parse(request: &[u8]) -> Self {
        let line = request.split(|&b| b == b'\n').next().unwrap_or_default();
        let Ok(line) = core::str::from_utf8(line) else {
            return Route::BadRequest;
        };
        let mut parts = line.split_ascii_whitespace();
        let (Some(_method), Some(target)) = (parts.next(), parts.next()) else {
            return Route::BadRequest;
        };
        let path = target.split('?').next().unwrap_or(target);

        match path {
            "/" | "/index.html" => Route::Page,
            "/api/data" => Route::Data,
            "/api/status" => Route::Status,
            "/api/heartbeat" => Route::Heartbeat,
            "/api/wake" => Route::Wake,
            _ => Route::NotFound,
        }
    }
}

pub const TEXT: &str = "text/plain; charset=utf-8";
pub const JSON: &str = "application/json";

/// A complete response, ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: TEXT,
            body: Vec::from(body.as_bytes()),
        }
    }

    /// Serialize `payload`, falling back to a 500 when it cannot be encoded.
    pub fn json<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_vec(payload) {
            Ok(body) => Self {
                status: 200,
                content_type: JSON,
                body,
            },
            Err(e) => {
                warn!(" Status: JSON encoding failed: {}", e);
                Self::text(500, "Internal Server Error")
            }
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            _ => "Internal Server Error",
        }
    }

    /// Status line and headers, including the blank line.
    pub fn head(&self) -> heapless::String<160> {
        let mut head = heapless::String::new();
        // 160 bytes always fits the longest reason and content type.
        let _ = write!(
            head,
            "HTTP/1.0 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        );
        head
    }
}

fn age_s<T: Copy>(sample: &Sample<T>, now: Instant) -> Option<u64> {
    sample.age(now).map(|age| age.as_secs())
}

/// Body of `/api/data`. Values that are not fresh are `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPayload {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub pm1: Option<f32>,
    pub pm25: Option<f32>,
    pub pm10: Option<f32>,
    pub tvoc: Option<f32>,
    pub eco2: Option<f32>,
    pub aqi_pm25: Option<u16>,
    pub aqi_tvoc: Option<u8>,
    pub battery_voltage: Option<f32>,
    pub battery_percent: Option<u8>,
    pub climate_age_s: Option<u64>,
    pub particulate_age_s: Option<u64>,
    pub battery_age_s: Option<u64>,
}

impl DataPayload {
    pub fn new(snapshot: &CacheSnapshot, now: Instant) -> Self {
        let climate = snapshot.climate.current().unwrap_or_default();
        let air = snapshot.particulate.current().unwrap_or_default();
        let battery = snapshot.battery.current().unwrap_or_default();
        Self {
            temperature: climate.temperature_c,
            humidity: climate.humidity_pct,
            pm1: air.readings.pm1,
            pm25: air.readings.pm25,
            pm10: air.readings.pm10,
            tvoc: air.readings.tvoc_ppb,
            eco2: air.readings.eco2_ppm,
            aqi_pm25: air.aqi,
            aqi_tvoc: air.readings.aqi_tvoc,
            battery_voltage: battery.voltage,
            battery_percent: battery.percent,
            climate_age_s: age_s(&snapshot.climate, now),
            particulate_age_s: age_s(&snapshot.particulate, now),
            battery_age_s: age_s(&snapshot.battery, now),
        }
    }
}

fn domain_label(state: DomainState) -> &'static str {
    match state {
        DomainState::Awake => "awake",
        DomainState::Asleep => "asleep",
        DomainState::DutyCycling { .. } => "duty-cycling",
    }
}

/// Body of `/api/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub mode: &'static str,
    pub wifi_connected: bool,
    pub ip_address: Option<heapless::String<16>>,
    pub time_synced: bool,
    pub unix_time: Option<u64>,
    pub uptime_s: u64,
    pub display: &'static str,
    pub particulate_sensor: &'static str,
    pub active_sessions: usize,
}

impl StatusPayload {
    pub fn new(
        link: &LinkState,
        mode: OperatingMode,
        display: DomainState,
        particulate: DomainState,
        active_sessions: usize,
        now: Instant,
    ) -> Self {
        let ip_address = link.address.map(|addr| {
            let mut text = heapless::String::new();
            // A dotted quad is at most 15 bytes.
            let _ = write!(text, "{}", addr);
            text
        });
        Self {
            mode: mode.label(),
            wifi_connected: link.is_connected(),
            ip_address,
            time_synced: link.is_time_synced(),
            unix_time: link.unix_time(now),
            uptime_s: now.as_secs(),
            display: domain_label(display),
            particulate_sensor: domain_label(particulate),
            active_sessions,
        }
    }
}

/// Body of `/api/heartbeat` and `/api/wake`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AckPayload {
    pub status: &'static str,
    pub uptime_s: u64,
    pub active_sessions: usize,
}

impl AckPayload {
    pub fn ok(active_sessions: usize, now: Instant) -> Self {
        Self {
            status: "ok",
            uptime_s: now.as_secs(),
            active_sessions,
        }
    }
}
