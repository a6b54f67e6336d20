// Window planning: pure arithmetic over series boundaries read once at the
// start of a run. Windows are uniform, contiguous, and never cover a
// trailing interval the source may still be filling.

use crate::models::Window;

/// Series boundaries, read once at planning time and never re-read mid-run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesBounds {
    /// Earliest source packet timestamp for this series.
    pub source_first: Option<i64>,
    /// Latest source packet timestamp for this series.
    pub source_last: Option<i64>,
    /// High-water mark: timestamp of the most recent destination record.
    pub dest_last: Option<i64>,
}

/// Floors a timestamp to the nearest interval boundary at or below it.
pub fn floor_to_interval(ts: i64, interval_ms: i64) -> i64 {
    ts.div_euclid(interval_ms) * interval_ms
}

/// Enumerates the backfill windows for one series.
///
/// The range is `(start, end]` with `start` the high-water mark (or the
/// first source packet floored to an interval boundary) and `end` the
/// smaller of `requested_end` and the last source timestamp, both floored.
/// Flooring the source side means a window is only planned once the data
/// to fill it completely may already exist; a half-filled trailing window
/// is left for a later run rather than emitted and corrected.
pub fn plan_windows(bounds: SeriesBounds, interval_ms: i64, requested_end: i64) -> Vec<Window> {
    let (Some(source_first), Some(source_last)) = (bounds.source_first, bounds.source_last) else {
        return vec![];
    };

    let start = bounds
        .dest_last
        .unwrap_or_else(|| floor_to_interval(source_first, interval_ms));
    let end = floor_to_interval(requested_end, interval_ms)
        .min(floor_to_interval(source_last, interval_ms));

    if start >= end {
        // Already caught up; a legitimate steady-state outcome.
        return vec![];
    }

    let mut windows = Vec::with_capacity(((end - start) / interval_ms) as usize);
    let mut s = start;
    while s + interval_ms <= end {
        windows.push(Window {
            start: s,
            stop: s + interval_ms,
        });
        s += interval_ms;
    }
    windows
}
