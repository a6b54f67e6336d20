// Shared test helpers

use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;
use wxserver::models::{Packet, TagSet};
use wxserver::policy::AggregationPolicy;
use wxserver::store::{SqliteStore, TimeSeriesStore};
use wxserver::subsample::SubsamplingSpec;

/// 1-Feb-2018 0000 UTC, in ms.
pub const START: i64 = 1_517_443_200_000;
/// How long between loop packets.
pub const LOOP_INTERVAL: i64 = 10_000;
/// The subsampled record interval (5 minutes).
pub const RECORD_INTERVAL: i64 = 300_000;
/// The period of the test temperature wave.
pub const PERIOD: i64 = 3_600_000;

pub async fn temp_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wx.db");
    let store = SqliteStore::connect(path.to_str().unwrap()).await.unwrap();
    store.init().await.unwrap();
    (dir, Arc::new(store))
}

pub fn platform_tags(platform: &str) -> TagSet {
    BTreeMap::from([("platform".to_string(), platform.to_string())])
}

/// The aggregates table used across the engine tests: expression reducers
/// of every op plus one derived function over implicit inputs.
pub fn test_aggregates() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("out_temp".to_string(), "mean".to_string()),
        ("wind_speed".to_string(), "mean".to_string()),
        ("windgust_speed".to_string(), "max(wind_speed)".to_string()),
        ("rain_rain".to_string(), "sum".to_string()),
        ("unit_system".to_string(), "last".to_string()),
        (
            "wind_dir".to_string(),
            "vector_direction(x_wind_speed, y_wind_speed)".to_string(),
        ),
    ])
}

pub fn test_spec(source: &str, destination: &str, end_ts: Option<i64>) -> SubsamplingSpec {
    SubsamplingSpec {
        source: source.to_string(),
        destination: destination.to_string(),
        interval_ms: RECORD_INTERVAL,
        policy: AggregationPolicy::parse(&test_aggregates()).unwrap(),
        end_ts,
    }
}

/// One hour of packets every 10 s starting just after `start`. Values are
/// simple functions of time (plus a per-platform base) so window aggregates
/// can be recomputed independently in the assertions.
pub fn hour_of_packets(start: i64, platform: &str, base: f64) -> Vec<Packet> {
    let n = PERIOD / LOOP_INTERVAL + 1;
    (0..n)
        .map(|i| {
            let t = start + i * LOOP_INTERVAL;
            let phase =
                2.0 * std::f64::consts::PI * ((t - start) as f64) / (PERIOD as f64);
            Packet::new(t, platform_tags(platform))
                .with_field("out_temp", phase.sin() + base)
                .with_field("wind_speed", phase.cos() + base)
                .with_field("x_wind_speed", phase.cos() + base)
                .with_field("y_wind_speed", phase.sin() + base)
                .with_field("rain_rain", 0.01)
                .with_field("unit_system", 16.0)
        })
        .collect()
}

pub async fn populate(store: &SqliteStore, measurement: &str, packets: &[Packet]) {
    for packet in packets {
        store.insert(measurement, packet).await.unwrap();
    }
}

/// Arithmetic mean of one field over the packets with `start < t <= stop`,
/// ignoring packets where the field is absent. None when no packet in the
/// window carries it.
pub fn window_mean(packets: &[Packet], field: &str, start: i64, stop: i64) -> Option<f64> {
    let values: Vec<f64> = packets
        .iter()
        .filter(|p| p.timestamp > start && p.timestamp <= stop)
        .filter_map(|p| p.fields.get(field).copied())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn window_max(packets: &[Packet], field: &str, start: i64, stop: i64) -> Option<f64> {
    packets
        .iter()
        .filter(|p| p.timestamp > start && p.timestamp <= stop)
        .filter_map(|p| p.fields.get(field).copied())
        .fold(None, |acc, v| match acc {
            Some(m) if m >= v => Some(m),
            _ => Some(v),
        })
}

pub fn assert_close(a: f64, b: f64, context: &str) {
    assert!(
        (a - b).abs() < 1e-9,
        "{}: {} vs {} (diff {})",
        context,
        a,
        b,
        (a - b).abs()
    );
}
