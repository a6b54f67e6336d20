use crate::policy::{AggregationPolicy, ident_ok};
use crate::subsample::SubsamplingSpec;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub publishing: PublishingConfig,
    pub subsampling: SubsamplingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    /// Raw source packets are pruned after this many hours.
    #[serde(default = "default_raw_retention_hours")]
    pub raw_retention_hours: u32,
    /// Aggregated records are pruned after this many days.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_raw_retention_hours() -> u32 {
    48
}

fn default_retention_days() -> u32 {
    365
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max number of record events kept in the broadcast channel for
    /// /ws/records (slow clients may lag).
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubsamplingConfig {
    /// How often the subsampling trigger fires. Every spec interval must be
    /// a multiple of this granularity.
    pub trigger_interval_secs: u64,
    /// Max simultaneous in-flight window aggregations per run.
    pub max_concurrent_windows: usize,
    /// Optional cron expression for VACUUM (e.g. "0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
    pub specs: Vec<SpecConfig>,
}

/// One source/destination subsampling entry, as written in config.toml.
/// `aggregates` maps each observation type to a reducer string, e.g.
/// "mean", "sum", "max(wind_speed)", or
/// "vector_direction(x_wind_speed, y_wind_speed)".
#[derive(Debug, Clone, Deserialize)]
pub struct SpecConfig {
    pub source: String,
    pub destination: String,
    pub interval_ms: i64,
    pub aggregates: BTreeMap<String, String>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the parsed subsampling specs. Call after validate().
    pub fn subsampling_specs(&self) -> anyhow::Result<Vec<SubsamplingSpec>> {
        self.subsampling
            .specs
            .iter()
            .map(|sc| {
                Ok(SubsamplingSpec {
                    source: sc.source.clone(),
                    destination: sc.destination.clone(),
                    interval_ms: sc.interval_ms,
                    policy: AggregationPolicy::parse(&sc.aggregates)?,
                    end_ts: None,
                })
            })
            .collect()
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.raw_retention_hours > 0,
            "database.raw_retention_hours must be > 0, got {}",
            self.database.raw_retention_hours
        );
        anyhow::ensure!(
            self.database.retention_days > 0,
            "database.retention_days must be > 0, got {}",
            self.database.retention_days
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        anyhow::ensure!(
            self.subsampling.trigger_interval_secs > 0,
            "subsampling.trigger_interval_secs must be > 0, got {}",
            self.subsampling.trigger_interval_secs
        );
        anyhow::ensure!(
            self.subsampling.max_concurrent_windows > 0,
            "subsampling.max_concurrent_windows must be > 0, got {}",
            self.subsampling.max_concurrent_windows
        );
        anyhow::ensure!(
            self.subsampling.vacuum_interval_secs > 0,
            "subsampling.vacuum_interval_secs must be > 0, got {}",
            self.subsampling.vacuum_interval_secs
        );
        anyhow::ensure!(
            !self.subsampling.specs.is_empty(),
            "subsampling.specs must not be empty"
        );

        let trigger_ms = self.subsampling.trigger_interval_secs as i64 * 1000;
        for sc in &self.subsampling.specs {
            anyhow::ensure!(
                ident_ok(&sc.source),
                "invalid source measurement name {:?}",
                sc.source
            );
            anyhow::ensure!(
                ident_ok(&sc.destination),
                "invalid destination measurement name {:?}",
                sc.destination
            );
            anyhow::ensure!(
                sc.source != sc.destination,
                "spec for {:?} writes back into its own source",
                sc.source
            );
            anyhow::ensure!(
                sc.interval_ms > 0,
                "interval_ms must be > 0 for {} -> {}, got {}",
                sc.source,
                sc.destination,
                sc.interval_ms
            );
            // A spec whose interval is not a whole number of trigger ticks
            // would drift against the schedule; reject it up front.
            anyhow::ensure!(
                sc.interval_ms % trigger_ms == 0,
                "interval_ms {} for {} -> {} is not a multiple of trigger_interval_secs ({}s)",
                sc.interval_ms,
                sc.source,
                sc.destination,
                self.subsampling.trigger_interval_secs
            );
            AggregationPolicy::parse(&sc.aggregates).map_err(|e| {
                anyhow::anyhow!("aggregates for {} -> {}: {}", sc.source, sc.destination, e)
            })?;
        }
        Ok(())
    }
}
