// One-window aggregation: a single store query scoped to the window and
// series, the one-row contract check, in-process derived reducers, then
// exactly one insert when the window produced anything.

use super::{SubsampleError, SubsamplingSpec};
use crate::models::{Packet, TagSet, Window};
use crate::policy::Reducer;
use crate::store::TimeSeriesStore;

/// Aggregates one window of one series into a record and writes it to the
/// destination. `Ok(None)` means the window was empty: not an error, and
/// nothing is inserted.
pub async fn aggregate_window(
    store: &dyn TimeSeriesStore,
    spec: &SubsamplingSpec,
    tags: &TagSet,
    window: Window,
) -> Result<Option<Packet>, SubsampleError> {
    let rows = store
        .query_aggregate(&spec.source, tags, window, spec.policy.query_columns())
        .await?;
    let row = match rows.as_slice() {
        [] => return Ok(None),
        [row] => row,
        _ => {
            return Err(SubsampleError::Contract {
                window,
                rows: rows.len(),
            });
        }
    };

    // Record timestamp is the window's end: the record summarizes
    // everything in (start, stop].
    let mut record = Packet::new(window.stop, tags.clone());
    for (obs_type, reducer) in spec.policy.entries() {
        let value = match reducer {
            Reducer::Expression(_) => row.get(obs_type.as_str()).copied().flatten(),
            Reducer::Derived(derived) => {
                let inputs: Vec<Option<f64>> = derived
                    .inputs
                    .iter()
                    .map(|col| {
                        spec.policy
                            .mean_alias(col)
                            .and_then(|alias| row.get(alias).copied().flatten())
                    })
                    .collect();
                (derived.func)(&inputs)
            }
        };
        // Nulls are omitted, never written.
        if let Some(v) = value {
            record.fields.insert(obs_type.clone(), v);
        }
    }

    if record.fields.is_empty() {
        // Packets fell in the window but carried none of the policy's
        // fields; a fieldless record holds nothing worth storing.
        return Ok(None);
    }

    store.insert(&spec.destination, &record).await?;
    Ok(Some(record))
}
