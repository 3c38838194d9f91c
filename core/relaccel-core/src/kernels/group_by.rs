//! Hash group-by with one aggregate per group.

use ahash::AHashMap;

use super::aggregate::aggregate;
use super::{KeyRef, scalars_to_column};
use crate::error::{AccelError, AccelResult};
use crate::frame::ColumnData;
use crate::types::AggregateType;

/// Grouped result: one row per distinct key, in first-appearance order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Groups {
    pub(crate) keys: ColumnData,
    pub(crate) values: ColumnData,
}

impl Groups {
    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Group `values` by `keys` and aggregate each group. NaN keys form a
/// single group.
pub(crate) fn group_by(
    keys: &ColumnData,
    values: &ColumnData,
    agg: AggregateType,
) -> AccelResult<Groups> {
    if keys.len() != values.len() {
        return Err(AccelError::invalid("group and aggregate columns differ in length"));
    }
    let result_type = agg.result_type(values.column_type())?;

    let mut index: AHashMap<KeyRef<'_>, usize> = AHashMap::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for row in 0..keys.len() {
        // nan_is_key = true, so every row has a key
        let Some(key) = KeyRef::of(keys, row, true) else {
            continue;
        };
        let group = *index.entry(key).or_insert_with(|| {
            members.push(Vec::new());
            members.len() - 1
        });
        members[group].push(row);
    }

    let first_rows: Vec<usize> = members.iter().map(|rows| rows[0]).collect();
    let scalars = members
        .iter()
        .map(|rows| {
            aggregate(&values.take(rows), agg)?
                .ok_or_else(|| AccelError::invalid("empty group"))
        })
        .collect::<AccelResult<Vec<_>>>()?;

    Ok(Groups {
        keys: keys.take(&first_rows),
        values: scalars_to_column(result_type, scalars)?,
    })
}
