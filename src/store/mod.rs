// Time-series store contract. The subsampling engine consumes only this
// narrow query/write surface; SQLite is the production implementation.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::{Packet, TagSet, Window};
use crate::policy::QueryColumn;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("malformed stored row: {0}")]
    MalformedRow(String),
}

/// One result row of a window aggregation query: column alias -> value,
/// null where no packet in the window carried the source field.
pub type AggregateRow = BTreeMap<String, Option<f64>>;

/// Durable time-series engine. Implementations must scope every query to
/// exactly the given measurement and tag set; aggregations never mix series.
#[async_trait::async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Distinct tag sets present in a measurement.
    async fn list_distinct_series(&self, measurement: &str) -> Result<Vec<TagSet>, StoreError>;

    /// Timestamp of the earliest packet in the series, if any.
    async fn first_timestamp(
        &self,
        measurement: &str,
        tags: &TagSet,
    ) -> Result<Option<i64>, StoreError>;

    /// Timestamp of the most recent packet in the series, if any.
    async fn last_timestamp(
        &self,
        measurement: &str,
        tags: &TagSet,
    ) -> Result<Option<i64>, StoreError>;

    /// Aggregates the series' packets inside `(window.start, window.stop]`.
    /// Contract: zero rows when no packet fell in the window, one row
    /// otherwise. The caller treats anything longer as a violation.
    async fn query_aggregate(
        &self,
        measurement: &str,
        tags: &TagSet,
        window: Window,
        columns: &[QueryColumn],
    ) -> Result<Vec<AggregateRow>, StoreError>;

    /// Writes one packet (or aggregated record) to a measurement.
    async fn insert(&self, measurement: &str, packet: &Packet) -> Result<(), StoreError>;
}
