// Time-windowed subsampling engine: per tag-series, plan the backfill
// windows, aggregate each into one record, insert it into the destination
// series, and notify subscribers. Resumable from the destination's
// high-water mark; safe to invoke repeatedly.

pub mod aggregator;
pub mod planner;
pub mod scheduler;

pub use scheduler::Scheduler;

use crate::models::Window;
use crate::policy::AggregationPolicy;
use crate::store::StoreError;
use std::collections::BTreeMap;

/// One source/destination subsampling configuration, immutable during a run.
#[derive(Debug, Clone)]
pub struct SubsamplingSpec {
    pub source: String,
    pub destination: String,
    pub interval_ms: i64,
    pub policy: AggregationPolicy,
    /// Optional explicit end boundary; wall-clock now when absent. Either
    /// way the planner floors it to the interval and caps it at the last
    /// complete source window.
    pub end_ts: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubsampleError {
    /// Boundary or tag-discovery lookups failed before any window ran.
    /// Fails only the series being planned.
    #[error("planning failed: {0}")]
    Planning(#[source] StoreError),
    /// The store returned more than one row for a single window.
    #[error("aggregation for window {window} returned {rows} rows, expected at most one")]
    Contract { window: Window, rows: usize },
    /// A window's query or insert failed. Never retried here; the next run
    /// resumes from the high-water mark.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A window task died before reporting a result.
    #[error("window task failed: {0}")]
    Task(String),
}

/// Per-series outcome of one run, keyed by the series' canonical tag JSON:
/// the number of records created, or the error that failed the series.
/// One series' failure never aborts its siblings.
pub type RunReport = BTreeMap<String, Result<u64, SubsampleError>>;
