//! Telemetry points published from a cache snapshot

use log::{debug, warn};

use super::NetworkPublisher;
use crate::cache::CacheSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Temperature,
    Humidity,
    Pm1,
    Pm25,
    Tvoc,
    Eco2,
    Aqi,
}

impl Topic {
    pub fn path(&self) -> &'static str {
        match self {
            Topic::Temperature => "ds/Temperature",
            Topic::Humidity => "ds/Humidity",
            Topic::Pm1 => "ds/PM1",
            Topic::Pm25 => "ds/PM2_5",
            Topic::Tvoc => "ds/TVOC",
            Topic::Eco2 => "ds/eCO2",
            Topic::Aqi => "ds/AQI",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishPoint {
    pub topic: Topic,
    pub value: f32,
}

/// Running totals kept by the publish task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub published: u32,
    pub errors: u32,
    pub rounds: u32,
}

/// Every value in `snapshot` worth publishing.
///
/// Groups whose last acquisition failed contribute nothing, and missing
/// fields are skipped rather than sent as placeholders.
pub fn publish_points(snapshot: &CacheSnapshot) -> heapless::Vec<PublishPoint, 7> {
    let climate = snapshot.climate.current().unwrap_or_default();
    let particulate = snapshot.particulate.current().unwrap_or_default();

    let candidates = [
        (Topic::Temperature, climate.temperature_c),
        (Topic::Humidity, climate.humidity_pct),
        (Topic::Pm1, particulate.readings.pm1),
        (Topic::Pm25, particulate.readings.pm25),
        (Topic::Tvoc, particulate.readings.tvoc_ppb),
        (Topic::Eco2, particulate.readings.eco2_ppm),
        (Topic::Aqi, particulate.aqi.map(f32::from)),
    ];

    candidates
        .into_iter()
        .filter_map(|(topic, value)| value.map(|value| PublishPoint { topic, value }))
        .collect()
}

/// Publish one round, counting failures instead of aborting on them.
pub async fn publish_snapshot<P: NetworkPublisher>(
    publisher: &mut P,
    snapshot: &CacheSnapshot,
    stats: &mut PublishStats,
) {
    let points = publish_points(snapshot);
    for point in &points {
        match publisher.publish(point.topic.path(), point.value).await {
            Ok(()) => stats.published = stats.published.wrapping_add(1),
            Err(e) => {
                stats.errors = stats.errors.wrapping_add(1);
                warn!(" Publish: {} failed: {}", point.topic.path(), e);
            }
        }
    }
    stats.rounds = stats.rounds.wrapping_add(1);
    debug!(
        " Publish: round {} sent {} points ({} errors total)",
        stats.rounds,
        points.len(),
        stats.errors
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GroupUpdate, SensorCache};
    use crate::error::NetworkError;
    use crate::sensors::{ClimateReadings, ParticulateReadings};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_time::Instant;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: heapless::Vec<(heapless::String<16>, f32), 8>,
        fail_topic: Option<&'static str>,
    }

    impl NetworkPublisher for RecordingPublisher {
        async fn publish(&mut self, topic: &str, value: f32) -> Result<(), NetworkError> {
            if self.fail_topic == Some(topic) {
                return Err(NetworkError::Publish(crate::error::message("broker gone")));
            }
            self.sent
                .push((crate::error::message(topic), value))
                .unwrap();
            Ok(())
        }
    }

    fn populated_cache() -> SensorCache<NoopRawMutex> {
        let cache = SensorCache::new();
        cache.update(
            GroupUpdate::Climate(Some(ClimateReadings {
                temperature_c: Some(21.5),
                humidity_pct: None,
            })),
            Instant::from_secs(1),
        );
        cache.update(
            GroupUpdate::Particulate(Some(ParticulateReadings {
                pm25: Some(12.0),
                ..Default::default()
            })),
            Instant::from_secs(1),
        );
        cache
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let points = publish_points(&populated_cache().snapshot());
        let topics: heapless::Vec<Topic, 7> = points.iter().map(|p| p.topic).collect();
        assert_eq!(topics.as_slice(), &[Topic::Temperature, Topic::Pm25, Topic::Aqi]);
        assert_eq!(points[2].value, 50.0);
    }

    #[test]
    fn test_empty_cache_publishes_nothing() {
        let cache = SensorCache::<NoopRawMutex>::new();
        assert!(publish_points(&cache.snapshot()).is_empty());
    }

    #[test]
    fn test_errors_are_counted_not_fatal() {
        let mut publisher = RecordingPublisher {
            fail_topic: Some("ds/PM2_5"),
            ..Default::default()
        };
        let mut stats = PublishStats::default();
        block_on(publish_snapshot(
            &mut publisher,
            &populated_cache().snapshot(),
            &mut stats,
        ));

        assert_eq!(stats.published, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(publisher.sent[1].0.as_str(), "ds/AQI");
        assert_eq!(publisher.sent[1].1, 50.0);
    }
}
