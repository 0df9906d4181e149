//! Plain-text status page served to remote clients

use core::fmt::{self, Write};

use embassy_time::Instant;
use log::warn;

use super::LinkState;
use crate::cache::CacheSnapshot;
use crate::config::OperatingMode;
use crate::power::DomainState;

const NOT_DETECTED: &str = "not detected";

fn line(out: &mut impl Write, label: &str, value: Option<f32>, unit: &str) -> fmt::Result {
    match value {
        Some(v) => writeln!(out, "{}: {:.1} {}", label, v, unit),
        None => writeln!(out, "{}: {}", label, NOT_DETECTED),
    }
}

fn write_report(
    out: &mut impl Write,
    snapshot: &CacheSnapshot,
    link: &LinkState,
    mode: OperatingMode,
    display: DomainState,
    particulate: DomainState,
    now: Instant,
) -> fmt::Result {
    let climate = snapshot.climate.current().unwrap_or_default();
    let air = snapshot.particulate.current().unwrap_or_default();
    let battery = snapshot.battery.current().unwrap_or_default();

    writeln!(out, "airwatch")?;
    writeln!(out, "mode: {}", mode.label())?;
    match link.unix_time(now) {
        Some(unix) => writeln!(out, "time: {}", unix)?,
        None => writeln!(out, "time: not synced")?,
    }
    writeln!(out, "uptime: {}s", now.as_secs())?;

    line(out, "temperature", climate.temperature_c, "C")?;
    line(out, "humidity", climate.humidity_pct, "%")?;
    line(out, "pm1", air.readings.pm1, "ug/m3")?;
    line(out, "pm2.5", air.readings.pm25, "ug/m3")?;
    line(out, "pm10", air.readings.pm10, "ug/m3")?;
    line(out, "tvoc", air.readings.tvoc_ppb, "ppb")?;
    line(out, "eco2", air.readings.eco2_ppm, "ppm")?;
    match air.aqi {
        Some(aqi) => writeln!(out, "aqi: {}", aqi)?,
        None => writeln!(out, "aqi: {}", NOT_DETECTED)?,
    }
    if battery.is_charging() {
        writeln!(out, "battery: charging")?;
    } else {
        line(out, "battery", battery.voltage, "V")?;
    }

    writeln!(out, "display: {:?}", display)?;
    writeln!(out, "particulate sensor: {:?}", particulate)
}

/// Render the status page; output that does not fit is cut off.
pub fn status_report(
    snapshot: &CacheSnapshot,
    link: &LinkState,
    mode: OperatingMode,
    display: DomainState,
    particulate: DomainState,
    now: Instant,
) -> heapless::String<640> {
    let mut out = heapless::String::new();
    if write_report(&mut out, snapshot, link, mode, display, particulate, now).is_err() {
        warn!(" Status: report truncated at {} bytes", out.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GroupUpdate, SensorCache};
    use crate::sensors::{BatteryReadings, ClimateReadings};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_report_marks_missing_values() {
        let cache = SensorCache::<NoopRawMutex>::new();
        cache.update(
            GroupUpdate::Climate(Some(ClimateReadings {
                temperature_c: Some(22.04),
                humidity_pct: None,
            })),
            Instant::from_secs(3),
        );
        cache.update(
            GroupUpdate::Battery(Some(BatteryReadings {
                voltage: Some(4.3),
                percent: Some(100),
            })),
            Instant::from_secs(3),
        );

        let report = status_report(
            &cache.snapshot(),
            &LinkState::default(),
            OperatingMode::Station,
            DomainState::Awake,
            DomainState::Asleep,
            Instant::from_secs(10),
        );

        assert!(report.contains("mode: Station"));
        assert!(report.contains("temperature: 22.0 C"));
        assert!(report.contains("humidity: not detected"));
        assert!(report.contains("aqi: not detected"));
        assert!(report.contains("battery: charging"));
        assert!(report.contains("time: not synced"));
    }
}
