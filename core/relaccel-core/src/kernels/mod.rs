//! Host kernels for the five relational primitives.
//!
//! These operate on decoded [`ColumnData`]/[`HostFrame`] values and know
//! nothing about buffers or backends. The simulated backend runs them
//! directly; the real backend runs them for the stages it does not offload.

pub(crate) mod aggregate;
pub(crate) mod filter;
pub(crate) mod group_by;
pub(crate) mod join;
pub(crate) mod sort;

use crate::error::{AccelError, AccelResult};
use crate::frame::ColumnData;
use crate::types::{ColumnType, ScalarValue};

/// Hashable view of one cell, used by hash join and group-by.
///
/// Integers of either width share `Int`; floats are compared by canonical
/// bits (`-0.0` folds into `0.0`, every NaN folds into one NaN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum KeyRef<'a> {
    Int(i64),
    Float(u64),
    Str(&'a str),
}

impl<'a> KeyRef<'a> {
    /// Key of `column[row]`. `None` for NaN when `nan_is_key` is false,
    /// since NaN never compares equal.
    pub(crate) fn of(column: &'a ColumnData, row: usize, nan_is_key: bool) -> Option<Self> {
        match column {
            ColumnData::Int32(v) => Some(KeyRef::Int(i64::from(v[row]))),
            ColumnData::Int64(v) => Some(KeyRef::Int(v[row])),
            ColumnData::Float32(v) => float_key(f64::from(v[row]), nan_is_key),
            ColumnData::Float64(v) => float_key(v[row], nan_is_key),
            ColumnData::Utf8(v) => Some(KeyRef::Str(&v[row])),
        }
    }
}

fn float_key<'a>(x: f64, nan_is_key: bool) -> Option<KeyRef<'a>> {
    if x.is_nan() {
        return nan_is_key.then_some(KeyRef::Float(f64::NAN.to_bits()));
    }
    // 0.0 == -0.0
    let canonical = if x == 0.0 { 0.0 } else { x };
    Some(KeyRef::Float(canonical.to_bits()))
}

/// Collect per-row scalars into a column of `column_type`.
pub(crate) fn scalars_to_column(
    column_type: ColumnType,
    values: Vec<ScalarValue>,
) -> AccelResult<ColumnData> {
    macro_rules! collect {
        ($variant:ident) => {
            values
                .into_iter()
                .map(|v| match v {
                    ScalarValue::$variant(x) => Ok(x),
                    other => Err(AccelError::invalid(format!(
                        "expected {} result, got {}",
                        column_type.as_str(),
                        other.column_type().as_str()
                    ))),
                })
                .collect::<AccelResult<Vec<_>>>()
                .map(ColumnData::$variant)
        };
    }

    match column_type {
        ColumnType::Int32 => collect!(Int32),
        ColumnType::Int64 => collect!(Int64),
        ColumnType::Float32 => collect!(Float32),
        ColumnType::Float64 => collect!(Float64),
        ColumnType::Utf8 => collect!(Utf8),
    }
}
