// Run driver: one concurrent task per tag-series, each walking
// Planning -> Running -> Draining -> Done; window aggregations across the
// whole run share one semaphore so the store never sees more than
// max_concurrent_windows queries in flight.

use super::{RunReport, SubsampleError, SubsamplingSpec, aggregator, planner};
use crate::models::{Packet, TagSet, Window, canonical_tags};
use crate::notifier::RecordNotifier;
use crate::store::TimeSeriesStore;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

pub struct Scheduler {
    store: Arc<dyn TimeSeriesStore>,
    notifier: Arc<dyn RecordNotifier>,
    /// Run-wide bound on in-flight window aggregations.
    window_permits: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        notifier: Arc<dyn RecordNotifier>,
        max_concurrent_windows: usize,
    ) -> Self {
        Self {
            store,
            notifier,
            window_permits: Arc::new(Semaphore::new(max_concurrent_windows.max(1))),
        }
    }

    /// One subsampling pass for the spec's source/destination pair.
    /// Idempotent: with no new source data a second call creates nothing.
    /// Callers must not overlap two runs for the same pair; overlapping
    /// runs could both read the same outdated high-water mark.
    #[instrument(skip(self, spec), fields(source = %spec.source, destination = %spec.destination))]
    pub async fn run(&self, spec: &SubsamplingSpec) -> Result<RunReport, SubsampleError> {
        let all_series = self
            .store
            .list_distinct_series(&spec.source)
            .await
            .map_err(SubsampleError::Planning)?;
        // One boundary for the whole run, shared by every series.
        let requested_end = spec.end_ts.unwrap_or_else(now_ms);

        let spec = Arc::new(spec.clone());
        let mut series_tasks = JoinSet::new();
        for tags in all_series {
            let store = self.store.clone();
            let notifier = self.notifier.clone();
            let permits = self.window_permits.clone();
            let spec = spec.clone();
            series_tasks.spawn(async move {
                let key = canonical_tags(&tags);
                let result =
                    run_series(store, notifier, permits, spec, tags, requested_end).await;
                (key, result)
            });
        }

        let mut report = RunReport::new();
        while let Some(joined) = series_tasks.join_next().await {
            match joined {
                Ok((key, result)) => {
                    report.insert(key, result);
                }
                Err(e) => {
                    warn!(error = %e, "series task failed to complete");
                }
            }
        }
        Ok(report)
    }
}

/// Planning -> Running -> Draining -> Done for one tag-series.
async fn run_series(
    store: Arc<dyn TimeSeriesStore>,
    notifier: Arc<dyn RecordNotifier>,
    permits: Arc<Semaphore>,
    spec: Arc<SubsamplingSpec>,
    tags: TagSet,
    requested_end: i64,
) -> Result<u64, SubsampleError> {
    // Planning: boundaries are read once; the high-water mark is never
    // re-read mid-run.
    let bounds = planner::SeriesBounds {
        source_first: store
            .first_timestamp(&spec.source, &tags)
            .await
            .map_err(SubsampleError::Planning)?,
        source_last: store
            .last_timestamp(&spec.source, &tags)
            .await
            .map_err(SubsampleError::Planning)?,
        dest_last: store
            .last_timestamp(&spec.destination, &tags)
            .await
            .map_err(SubsampleError::Planning)?,
    };
    let windows = planner::plan_windows(bounds, spec.interval_ms, requested_end);
    if windows.is_empty() {
        debug!(series = %canonical_tags(&tags), "caught up; no windows to fill");
        return Ok(0);
    }
    debug!(
        series = %canonical_tags(&tags),
        windows = windows.len(),
        "planned backfill"
    );

    // Running: submission suspends whenever the run-wide bound is reached;
    // permits free up as windows finish, even before they are joined.
    let mut in_flight: JoinSet<(Window, Result<Option<Packet>, SubsampleError>)> = JoinSet::new();
    for window in windows {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let store = store.clone();
        let spec = spec.clone();
        let tags = tags.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            let result = aggregator::aggregate_window(store.as_ref(), &spec, &tags, window).await;
            (window, result)
        });
    }

    // Draining: every submitted window completes before the series
    // resolves. The first failure fails the series, but records already
    // inserted stay committed; the next run resumes past them.
    let mut created: u64 = 0;
    let mut first_err: Option<SubsampleError> = None;
    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok((_, Ok(Some(record)))) => {
                created += 1;
                notifier.notify(&record, &spec.destination);
            }
            Ok((_, Ok(None))) => {} // empty window
            Ok((window, Err(e))) => {
                warn!(
                    series = %canonical_tags(&tags),
                    window = %window,
                    error = %e,
                    "window aggregation failed"
                );
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(SubsampleError::Task(e.to_string()));
                }
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(created),
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
