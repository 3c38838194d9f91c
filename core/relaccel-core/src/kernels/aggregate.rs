//! Scalar aggregates over one column.

use std::cmp::Ordering;

use crate::error::{AccelError, AccelResult};
use crate::frame::ColumnData;
use crate::types::{AggregateType, ScalarValue};

/// Aggregate `column`. `None` means there is no value to write: MIN, MAX or
/// AVG over zero rows.
pub(crate) fn aggregate(column: &ColumnData, agg: AggregateType) -> AccelResult<Option<ScalarValue>> {
    agg.result_type(column.column_type())?;

    if agg == AggregateType::Count {
        let rows = i64::try_from(column.len())
            .map_err(|_| AccelError::invalid("row count exceeds int64"))?;
        return Ok(Some(ScalarValue::Int64(rows)));
    }

    let value = match column {
        ColumnData::Int32(v) => match agg {
            AggregateType::Sum => Some(ScalarValue::Int32(checked_sum(v, i32::checked_add)?)),
            _ => extremum(v, agg, Ord::cmp).map(ScalarValue::Int32),
        },
        ColumnData::Int64(v) => match agg {
            AggregateType::Sum => Some(ScalarValue::Int64(checked_sum(v, i64::checked_add)?)),
            _ => extremum(v, agg, Ord::cmp).map(ScalarValue::Int64),
        },
        ColumnData::Float32(v) => match agg {
            // accumulate in f64
            AggregateType::Sum => {
                let sum = float_sum(v.iter().map(|&x| f64::from(x)));
                Some(ScalarValue::Float32(sum as f32))
            }
            AggregateType::Avg => float_avg(v.iter().map(|&x| f64::from(x)), v.len())
                .map(|x| ScalarValue::Float32(x as f32)),
            _ => extremum(v, agg, f32::total_cmp).map(ScalarValue::Float32),
        },
        ColumnData::Float64(v) => match agg {
            AggregateType::Sum => Some(ScalarValue::Float64(float_sum(v.iter().copied()))),
            AggregateType::Avg => float_avg(v.iter().copied(), v.len()).map(ScalarValue::Float64),
            _ => extremum(v, agg, f64::total_cmp).map(ScalarValue::Float64),
        },
        ColumnData::Utf8(v) => extremum(v, agg, Ord::cmp).map(ScalarValue::Utf8),
    };
    Ok(value)
}

fn checked_sum<T: Copy + Default>(values: &[T], add: fn(T, T) -> Option<T>) -> AccelResult<T> {
    values.iter().try_fold(T::default(), |acc, &x| {
        add(acc, x).ok_or_else(|| AccelError::invalid("integer SUM overflows its column type"))
    })
}

fn float_sum(values: impl Iterator<Item = f64>) -> f64 {
    values.sum()
}

fn float_avg(values: impl Iterator<Item = f64>, n: usize) -> Option<f64> {
    (n > 0).then(|| float_sum(values) / n as f64)
}

/// MIN or MAX; ties keep the first occurrence.
fn extremum<T: Clone>(
    values: &[T],
    agg: AggregateType,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Option<T> {
    let best = match agg {
        AggregateType::Min => values.iter().reduce(|a, b| if cmp(b, a).is_lt() { b } else { a }),
        _ => values.iter().reduce(|a, b| if cmp(b, a).is_gt() { b } else { a }),
    };
    best.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn integer_aggregates() {
        let col = ColumnData::Int32(vec![4, -2, 9, 1]);
        assert_eq!(aggregate(&col, AggregateType::Sum).unwrap(), Some(ScalarValue::Int32(12)));
        assert_eq!(aggregate(&col, AggregateType::Min).unwrap(), Some(ScalarValue::Int32(-2)));
        assert_eq!(aggregate(&col, AggregateType::Max).unwrap(), Some(ScalarValue::Int32(9)));
        assert_eq!(aggregate(&col, AggregateType::Count).unwrap(), Some(ScalarValue::Int64(4)));
    }

    #[test]
    fn integer_sum_overflow_is_invalid() {
        let col = ColumnData::Int32(vec![i32::MAX, 1]);
        let err = aggregate(&col, AggregateType::Sum).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn float_average() {
        let col = ColumnData::Float64(vec![1.0, 2.0, 4.5]);
        assert_eq!(aggregate(&col, AggregateType::Avg).unwrap(), Some(ScalarValue::Float64(2.5)));
        let col = ColumnData::Float32(vec![1.0, 2.0]);
        assert_eq!(aggregate(&col, AggregateType::Avg).unwrap(), Some(ScalarValue::Float32(1.5)));
    }

    #[test]
    fn avg_over_integers_is_unsupported() {
        let col = ColumnData::Int64(vec![1, 2]);
        let err = aggregate(&col, AggregateType::Avg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn empty_inputs() {
        let col = ColumnData::Float64(vec![]);
        assert_eq!(aggregate(&col, AggregateType::Sum).unwrap(), Some(ScalarValue::Float64(0.0)));
        assert_eq!(aggregate(&col, AggregateType::Count).unwrap(), Some(ScalarValue::Int64(0)));
        assert_eq!(aggregate(&col, AggregateType::Min).unwrap(), None);
        assert_eq!(aggregate(&col, AggregateType::Avg).unwrap(), None);
    }

    #[test]
    fn string_extremes() {
        let col = ColumnData::Utf8(vec!["pear".into(), "apple".into(), "zebra".into()]);
        assert_eq!(
            aggregate(&col, AggregateType::Min).unwrap(),
            Some(ScalarValue::Utf8("apple".into()))
        );
        assert_eq!(
            aggregate(&col, AggregateType::Max).unwrap(),
            Some(ScalarValue::Utf8("zebra".into()))
        );
        assert_eq!(
            aggregate(&col, AggregateType::Sum).unwrap_err().kind(),
            ErrorKind::NotSupported
        );
    }
}
