// Window planner tests: pure window arithmetic, no store involved.

use wxserver::subsample::planner::{SeriesBounds, floor_to_interval, plan_windows};

const INTERVAL: i64 = 300_000;
const T0: i64 = 1_517_443_200_000; // already on a 5-min boundary

#[test]
fn floor_to_interval_aligns_down() {
    assert_eq!(floor_to_interval(T0, INTERVAL), T0);
    assert_eq!(floor_to_interval(T0 + 1, INTERVAL), T0);
    assert_eq!(floor_to_interval(T0 + 299_999, INTERVAL), T0);
    assert_eq!(floor_to_interval(T0 + 300_000, INTERVAL), T0 + 300_000);
}

#[test]
fn no_source_data_plans_nothing() {
    let windows = plan_windows(SeriesBounds::default(), INTERVAL, T0 + 3_600_000);
    assert!(windows.is_empty());
}

#[test]
fn first_backfill_floors_to_interval_boundary() {
    // Source starts mid-interval; the first window still starts on a boundary.
    let bounds = SeriesBounds {
        source_first: Some(T0 + 1234),
        source_last: Some(T0 + 3_600_000),
        dest_last: None,
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 7_200_000);
    assert_eq!(windows.len(), 12);
    assert_eq!(windows[0].start, T0);
    assert_eq!(windows[0].stop, T0 + INTERVAL);
    assert_eq!(windows[11].stop, T0 + 3_600_000);
}

#[test]
fn windows_are_uniform_and_contiguous() {
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 3_600_000),
        dest_last: None,
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 3_600_000);
    assert!(!windows.is_empty());
    for w in &windows {
        assert_eq!(w.len_ms(), INTERVAL);
    }
    for pair in windows.windows(2) {
        assert_eq!(pair[0].stop, pair[1].start);
    }
}

#[test]
fn resumes_from_high_water_mark() {
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 3_600_000),
        dest_last: Some(T0 + 300_000),
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 3_600_000);
    assert_eq!(windows.len(), 11);
    assert_eq!(windows[0].start, T0 + 300_000);
}

#[test]
fn caught_up_plans_nothing() {
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 3_600_000),
        dest_last: Some(T0 + 3_600_000),
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 7_200_000);
    assert!(windows.is_empty());
}

#[test]
fn high_water_mark_past_end_plans_nothing() {
    // Destination somehow ahead of the requested end: plan nothing rather
    // than going backwards.
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 3_600_000),
        dest_last: Some(T0 + 3_600_000),
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 600_000);
    assert!(windows.is_empty());
}

#[test]
fn requested_end_caps_the_backfill() {
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 3_600_000),
        dest_last: None,
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 900_000);
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[2].stop, T0 + 900_000);
}

#[test]
fn requested_end_is_floored() {
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 3_600_000),
        dest_last: None,
    };
    // One millisecond short of the third boundary: only two windows close.
    let windows = plan_windows(bounds, INTERVAL, T0 + 899_999);
    assert_eq!(windows.len(), 2);
}

#[test]
fn trailing_partial_source_window_is_excluded() {
    // Data reaches one ms short of the third boundary; that third window
    // may still be filling and must not be scheduled yet.
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 899_999),
        dest_last: None,
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 7_200_000);
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[1].stop, T0 + 600_000);
}

#[test]
fn source_last_exactly_on_boundary_closes_that_window() {
    let bounds = SeriesBounds {
        source_first: Some(T0),
        source_last: Some(T0 + 900_000),
        dest_last: None,
    };
    let windows = plan_windows(bounds, INTERVAL, T0 + 7_200_000);
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[2].stop, T0 + 900_000);
}
