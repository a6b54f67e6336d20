// Aggregation policy tests: reducer-string parsing and query-column layout.

use std::collections::BTreeMap;
use wxserver::policy::{AggregationPolicy, Reducer, ReducerOp};

fn aggregates(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn bare_op_defaults_to_observation_column() {
    let policy = AggregationPolicy::parse(&aggregates(&[("out_temp", "mean")])).unwrap();
    let (obs, reducer) = policy.entries().next().unwrap();
    assert_eq!(obs, "out_temp");
    match reducer {
        Reducer::Expression(expr) => {
            assert_eq!(expr.op, ReducerOp::Mean);
            assert_eq!(expr.column, "out_temp");
        }
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn explicit_column_is_kept() {
    let policy =
        AggregationPolicy::parse(&aggregates(&[("windgust_speed", "max(wind_speed)")])).unwrap();
    let (_, reducer) = policy.entries().next().unwrap();
    match reducer {
        Reducer::Expression(expr) => {
            assert_eq!(expr.op, ReducerOp::Max);
            assert_eq!(expr.column, "wind_speed");
        }
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn avg_is_a_synonym_for_mean() {
    for value in ["avg", "AVG", "Mean"] {
        let policy = AggregationPolicy::parse(&aggregates(&[("t", value)])).unwrap();
        let (_, reducer) = policy.entries().next().unwrap();
        match reducer {
            Reducer::Expression(expr) => assert_eq!(expr.op, ReducerOp::Mean),
            other => panic!("expected expression for {:?}, got {:?}", value, other),
        }
    }
}

#[test]
fn unknown_reducer_is_rejected() {
    assert!(AggregationPolicy::parse(&aggregates(&[("t", "median")])).is_err());
    assert!(AggregationPolicy::parse(&aggregates(&[("t", "frobnicate(x)")])).is_err());
}

#[test]
fn malformed_expression_is_rejected() {
    assert!(AggregationPolicy::parse(&aggregates(&[("t", "mean(")])).is_err());
    assert!(AggregationPolicy::parse(&aggregates(&[("t", "mean(a, b)")])).is_err());
}

#[test]
fn invalid_identifiers_are_rejected() {
    assert!(AggregationPolicy::parse(&aggregates(&[("out temp", "mean")])).is_err());
    assert!(AggregationPolicy::parse(&aggregates(&[("t", "mean(a;drop)")])).is_err());
    assert!(AggregationPolicy::parse(&aggregates(&[("1temp", "mean")])).is_err());
    assert!(AggregationPolicy::parse(&BTreeMap::new()).is_err());
}

#[test]
fn derived_function_parses_with_inputs() {
    let policy = AggregationPolicy::parse(&aggregates(&[(
        "wind_dir",
        "vector_direction(x_wind_speed, y_wind_speed)",
    )]))
    .unwrap();
    let (_, reducer) = policy.entries().next().unwrap();
    match reducer {
        Reducer::Derived(derived) => {
            assert_eq!(derived.name, "vector_direction");
            assert_eq!(derived.inputs, vec!["x_wind_speed", "y_wind_speed"]);
        }
        other => panic!("expected derived, got {:?}", other),
    }
}

#[test]
fn derived_function_arity_is_checked() {
    assert!(AggregationPolicy::parse(&aggregates(&[("d", "vector_direction(x)")])).is_err());
    assert!(AggregationPolicy::parse(&aggregates(&[("d", "vector_direction")])).is_err());
}

#[test]
fn derived_inputs_get_implicit_mean_columns() {
    let policy = AggregationPolicy::parse(&aggregates(&[(
        "wind_dir",
        "vector_direction(x_wind_speed, y_wind_speed)",
    )]))
    .unwrap();
    let columns = policy.query_columns();
    assert_eq!(columns.len(), 2);
    assert!(
        columns
            .iter()
            .all(|c| c.op == ReducerOp::Mean && (c.column == "x_wind_speed" || c.column == "y_wind_speed"))
    );
    assert!(policy.mean_alias("x_wind_speed").is_some());
    assert!(policy.mean_alias("y_wind_speed").is_some());
}

#[test]
fn derived_inputs_reuse_existing_mean_columns() {
    let policy = AggregationPolicy::parse(&aggregates(&[
        ("x_wind_speed", "mean"),
        ("y_wind_speed", "mean"),
        ("wind_dir", "vector_direction(x_wind_speed, y_wind_speed)"),
    ]))
    .unwrap();
    // No duplicate aggregates: the derived inputs resolve to the existing
    // expression columns.
    let columns = policy.query_columns();
    assert_eq!(columns.len(), 2);
    assert_eq!(policy.mean_alias("x_wind_speed"), Some("x_wind_speed"));
}

#[test]
fn query_columns_use_observation_type_as_alias() {
    let policy = AggregationPolicy::parse(&aggregates(&[
        ("wind_speed", "mean"),
        ("windgust_speed", "max(wind_speed)"),
    ]))
    .unwrap();
    let columns = policy.query_columns();
    assert_eq!(columns.len(), 2);
    let gust = columns
        .iter()
        .find(|c| c.alias == "windgust_speed")
        .unwrap();
    assert_eq!(gust.op, ReducerOp::Max);
    assert_eq!(gust.column, "wind_speed");
}
