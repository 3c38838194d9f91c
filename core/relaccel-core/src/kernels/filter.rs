//! Predicate evaluation.
//!
//! Numbers compare with their native ordering (a NaN cell satisfies only
//! `Ne`), strings compare lexicographically by bytes. `Between` is inclusive.

use crate::error::{AccelError, AccelResult};
use crate::frame::ColumnData;
use crate::types::{CompareOp, ScalarValue};

fn matches<T: PartialOrd + ?Sized>(v: &T, op: CompareOp, lo: &T, hi: Option<&T>) -> bool {
    match op {
        CompareOp::Eq => v == lo,
        CompareOp::Ne => v != lo,
        CompareOp::Lt => v < lo,
        CompareOp::Le => v <= lo,
        CompareOp::Gt => v > lo,
        CompareOp::Ge => v >= lo,
        CompareOp::Between => hi.is_some_and(|hi| v >= lo && v <= hi),
    }
}

fn select_where<T: PartialOrd + ?Sized, V: AsRef<T>>(
    values: &[V],
    op: CompareOp,
    lo: &T,
    hi: Option<&T>,
) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| matches(v.as_ref(), op, lo, hi))
        .map(|(i, _)| i)
        .collect()
}

fn select_numeric<T: PartialOrd + Copy>(
    values: &[T],
    op: CompareOp,
    lo: T,
    hi: Option<T>,
) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| matches(*v, op, &lo, hi.as_ref()))
        .map(|(i, _)| i)
        .collect()
}

/// Row indices of `column` satisfying `op` against `lower` (and `upper` for
/// `Between`), in input order.
pub(crate) fn select(
    column: &ColumnData,
    op: CompareOp,
    lower: &ScalarValue,
    upper: Option<&ScalarValue>,
) -> AccelResult<Vec<usize>> {
    let mismatch = || {
        AccelError::invalid(format!(
            "predicate value does not match {} column",
            column.column_type().as_str()
        ))
    };

    macro_rules! numeric {
        ($values:expr, $variant:ident) => {{
            let ScalarValue::$variant(lo) = lower else {
                return Err(mismatch());
            };
            let hi = match upper {
                None => None,
                Some(ScalarValue::$variant(hi)) => Some(*hi),
                Some(_) => return Err(mismatch()),
            };
            Ok(select_numeric($values, op, *lo, hi))
        }};
    }

    match column {
        ColumnData::Int32(v) => numeric!(v, Int32),
        ColumnData::Int64(v) => numeric!(v, Int64),
        ColumnData::Float32(v) => numeric!(v, Float32),
        ColumnData::Float64(v) => numeric!(v, Float64),
        ColumnData::Utf8(v) => {
            let ScalarValue::Utf8(lo) = lower else {
                return Err(mismatch());
            };
            let hi = match upper {
                None => None,
                Some(ScalarValue::Utf8(hi)) => Some(hi.as_str()),
                Some(_) => return Err(mismatch()),
            };
            Ok(select_where::<str, String>(v, op, lo.as_str(), hi))
        }
    }
}

/// Row indices whose mask byte is non-zero.
#[cfg_attr(not(feature = "gpu"), allow(dead_code))]
pub(crate) fn select_from_mask(mask: &[u8]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|(_, m)| **m != 0)
        .map(|(i, _)| i)
        .collect()
}
