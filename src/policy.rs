// Aggregation policy: maps each observation type to either a store-native
// reducer expression (pushed into the window query) or a derived function
// (evaluated in-process from the window's aggregated inputs).

use anyhow::{Context, bail, ensure};
use std::collections::BTreeMap;

/// Store-native reducer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerOp {
    Mean,
    Sum,
    Min,
    Max,
    Last,
}

impl ReducerOp {
    /// Case-insensitive parse; `avg` is a synonym for `mean`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "avg" => Some(Self::Mean),
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "last" => Some(Self::Last),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Last => "last",
        }
    }
}

/// One store-native reducer over one source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerExpr {
    pub op: ReducerOp,
    pub column: String,
}

/// Pure function over the window's aggregated input values, in declaration
/// order. Must yield `None` whenever any required input is `None`.
pub type DerivedFn = fn(&[Option<f64>]) -> Option<f64>;

/// A derived quantity that cannot be expressed as a single-column reducer.
/// `inputs` name the observation columns whose window means feed `func`.
#[derive(Clone)]
pub struct DerivedReducer {
    pub name: &'static str,
    pub inputs: Vec<String>,
    pub func: DerivedFn,
}

impl std::fmt::Debug for DerivedReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedReducer")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// Tagged reducer variant; dispatched explicitly, never by inspecting
/// config value types at run time.
#[derive(Debug, Clone)]
pub enum Reducer {
    Expression(ReducerExpr),
    Derived(DerivedReducer),
}

/// One column the store must aggregate for a window query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryColumn {
    /// Result-row key for this aggregate. Unique within a policy.
    pub alias: String,
    pub op: ReducerOp,
    pub column: String,
}

/// Per-measurement aggregation policy, parsed once from config strings like
/// `"mean"`, `"max(wind_speed)"`, or `"vector_direction(x_wind, y_wind)"`.
#[derive(Debug, Clone, Default)]
pub struct AggregationPolicy {
    entries: BTreeMap<String, Reducer>,
    /// Expression aggregates plus implicit means for derived inputs, in a
    /// fixed order with unique aliases.
    columns: Vec<QueryColumn>,
}

impl AggregationPolicy {
    pub fn parse(aggregates: &BTreeMap<String, String>) -> anyhow::Result<Self> {
        ensure!(!aggregates.is_empty(), "aggregates must not be empty");

        let mut entries = BTreeMap::new();
        for (obs_type, value) in aggregates {
            ensure!(
                ident_ok(obs_type),
                "invalid observation type name {:?}",
                obs_type
            );
            let reducer = parse_reducer(obs_type, value)
                .with_context(|| format!("aggregate for {:?}", obs_type))?;
            entries.insert(obs_type.clone(), reducer);
        }

        let columns = build_query_columns(&entries);
        Ok(Self { entries, columns })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Reducer)> {
        self.entries.iter()
    }

    pub fn query_columns(&self) -> &[QueryColumn] {
        &self.columns
    }

    /// Alias of the mean aggregate for a derived input column.
    pub fn mean_alias(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.op == ReducerOp::Mean && c.column == column)
            .map(|c| c.alias.as_str())
    }
}

/// Parses `op`, `op(column)`, or `derived_fn(input, ...)`.
fn parse_reducer(obs_type: &str, value: &str) -> anyhow::Result<Reducer> {
    let (name, args) = split_call(value)?;

    if let Some(op) = ReducerOp::parse(name) {
        let column = match args.as_slice() {
            [] => obs_type.to_string(),
            [col] => col.clone(),
            _ => bail!("reducer {:?} takes at most one column", name),
        };
        ensure!(ident_ok(&column), "invalid column name {:?}", column);
        return Ok(Reducer::Expression(ReducerExpr { op, column }));
    }

    // Not a reducer op: look up the derived-function registry.
    let derived = match name {
        "vector_direction" => {
            ensure!(
                args.len() == 2,
                "vector_direction takes exactly two inputs (x, y), got {}",
                args.len()
            );
            DerivedReducer {
                name: "vector_direction",
                inputs: args.clone(),
                func: vector_direction,
            }
        }
        _ => bail!("unknown reducer or derived function {:?}", name),
    };
    for input in &derived.inputs {
        ensure!(ident_ok(input), "invalid input column name {:?}", input);
    }
    Ok(Reducer::Derived(derived))
}

/// Splits `name` or `name(a, b)` into the name and its arguments.
fn split_call(value: &str) -> anyhow::Result<(&str, Vec<String>)> {
    let value = value.trim();
    let Some(open) = value.find('(') else {
        return Ok((value, vec![]));
    };
    ensure!(
        value.ends_with(')'),
        "malformed reducer expression {:?}",
        value
    );
    let name = value[..open].trim();
    let inner = &value[open + 1..value.len() - 1];
    let args: Vec<String> = inner
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    Ok((name, args))
}

/// Expression aggregates keep their observation type as alias; each derived
/// input gets an implicit mean, reusing an existing mean of the same column
/// when the policy already has one.
fn build_query_columns(entries: &BTreeMap<String, Reducer>) -> Vec<QueryColumn> {
    let mut columns: Vec<QueryColumn> = Vec::new();
    for (obs_type, reducer) in entries {
        if let Reducer::Expression(expr) = reducer {
            columns.push(QueryColumn {
                alias: obs_type.clone(),
                op: expr.op,
                column: expr.column.clone(),
            });
        }
    }
    for reducer in entries.values() {
        if let Reducer::Derived(derived) = reducer {
            for input in &derived.inputs {
                let present = columns
                    .iter()
                    .any(|c| c.op == ReducerOp::Mean && c.column == *input);
                if present {
                    continue;
                }
                let mut alias = input.clone();
                while columns.iter().any(|c| c.alias == alias) {
                    alias.push_str("_mean");
                }
                columns.push(QueryColumn {
                    alias,
                    op: ReducerOp::Mean,
                    column: input.clone(),
                });
            }
        }
    }
    columns
}

/// `[A-Za-z_][A-Za-z0-9_]*`. Observation and measurement names end up in
/// SQL, so anything else is rejected at config time.
pub fn ident_ok(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compass direction in degrees from orthogonal speed components.
/// `None` if either component is missing for the window.
fn vector_direction(inputs: &[Option<f64>]) -> Option<f64> {
    let x = *inputs.first()?;
    let y = *inputs.get(1)?;
    let (x, y) = (x?, y?);
    let mut d = 90.0 - y.atan2(x).to_degrees();
    if d < 0.0 {
        d += 360.0;
    }
    Some(d)
}
