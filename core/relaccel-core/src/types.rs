//! Operator tags shared by every primitive.
//!
//! Each tag carries a stable `i32` code (used by the C bindings) and parses
//! back with `TryFrom<i32>`, failing `InvalidValue` on unknown codes.

use serde::{Deserialize, Serialize};

use crate::error::{AccelError, AccelResult};

/// Default slot width for string columns, in bytes.
pub const DEFAULT_UTF8_WIDTH: usize = 32;

/// Runtime data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ColumnType {
    Int32 = 0,
    Int64 = 1,
    Float32 = 2,
    Float64 = 3,
    /// Fixed-width, NUL-padded UTF-8 slots
    Utf8 = 4,
}

impl ColumnType {
    /// Element width for fixed-width types. `None` for `Utf8`, whose width
    /// comes from the column layout.
    pub fn native_width(self) -> Option<usize> {
        match self {
            ColumnType::Int32 | ColumnType::Float32 => Some(4),
            ColumnType::Int64 | ColumnType::Float64 => Some(8),
            ColumnType::Utf8 => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ColumnType::Float32 | ColumnType::Float64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::Int32 | ColumnType::Int64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::Utf8 => "utf8",
        }
    }
}

impl TryFrom<i32> for ColumnType {
    type Error = AccelError;

    fn try_from(code: i32) -> AccelResult<Self> {
        match code {
            0 => Ok(ColumnType::Int32),
            1 => Ok(ColumnType::Int64),
            2 => Ok(ColumnType::Float32),
            3 => Ok(ColumnType::Float64),
            4 => Ok(ColumnType::Utf8),
            _ => Err(AccelError::invalid(format!("unknown column type code {code}"))),
        }
    }
}

/// Comparison used by filter predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CompareOp {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
    /// Inclusive on both bounds; needs a second value
    Between = 6,
}

impl TryFrom<i32> for CompareOp {
    type Error = AccelError;

    fn try_from(code: i32) -> AccelResult<Self> {
        match code {
            0 => Ok(CompareOp::Eq),
            1 => Ok(CompareOp::Ne),
            2 => Ok(CompareOp::Lt),
            3 => Ok(CompareOp::Le),
            4 => Ok(CompareOp::Gt),
            5 => Ok(CompareOp::Ge),
            6 => Ok(CompareOp::Between),
            _ => Err(AccelError::invalid(format!("unknown comparison code {code}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum JoinType {
    Inner = 0,
    Left = 1,
    Right = 2,
    Full = 3,
}

impl JoinType {
    /// Whether unmatched left rows are emitted.
    pub fn keeps_left(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// Whether unmatched right rows are emitted.
    pub fn keeps_right(self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

impl TryFrom<i32> for JoinType {
    type Error = AccelError;

    fn try_from(code: i32) -> AccelResult<Self> {
        match code {
            0 => Ok(JoinType::Inner),
            1 => Ok(JoinType::Left),
            2 => Ok(JoinType::Right),
            3 => Ok(JoinType::Full),
            _ => Err(AccelError::invalid(format!("unknown join type code {code}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AggregateType {
    Sum = 0,
    Count = 1,
    Min = 2,
    Max = 3,
    Avg = 4,
}

impl AggregateType {
    /// Type of the value an aggregate produces over a column of `input`.
    ///
    /// Rejects AVG over non-float columns and SUM over strings.
    pub fn result_type(self, input: ColumnType) -> AccelResult<ColumnType> {
        match (self, input) {
            (AggregateType::Count, _) => Ok(ColumnType::Int64),
            (AggregateType::Avg, t) if t.is_float() => Ok(t),
            (AggregateType::Avg, t) => Err(AccelError::unsupported(format!(
                "AVG over {} is not supported",
                t.as_str()
            ))),
            (AggregateType::Sum, ColumnType::Utf8) => {
                Err(AccelError::unsupported("SUM over utf8 is not supported"))
            }
            (_, t) => Ok(t),
        }
    }
}

impl TryFrom<i32> for AggregateType {
    type Error = AccelError;

    fn try_from(code: i32) -> AccelResult<Self> {
        match code {
            0 => Ok(AggregateType::Sum),
            1 => Ok(AggregateType::Count),
            2 => Ok(AggregateType::Min),
            3 => Ok(AggregateType::Max),
            4 => Ok(AggregateType::Avg),
            _ => Err(AccelError::invalid(format!("unknown aggregate code {code}"))),
        }
    }
}

/// A typed literal used as a filter bound.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ScalarValue::Int32(_) => ColumnType::Int32,
            ScalarValue::Int64(_) => ColumnType::Int64,
            ScalarValue::Float32(_) => ColumnType::Float32,
            ScalarValue::Float64(_) => ColumnType::Float64,
            ScalarValue::Utf8(_) => ColumnType::Utf8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn codes_parse_back() {
        for code in 0..5 {
            assert_eq!(ColumnType::try_from(code).unwrap() as i32, code);
        }
        for code in 0..7 {
            assert_eq!(CompareOp::try_from(code).unwrap() as i32, code);
        }
        for code in 0..4 {
            assert_eq!(JoinType::try_from(code).unwrap() as i32, code);
        }
        for code in 0..5 {
            assert_eq!(AggregateType::try_from(code).unwrap() as i32, code);
        }
    }

    #[test]
    fn unknown_codes_are_invalid() {
        assert_eq!(
            ColumnType::try_from(9).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            CompareOp::try_from(-1).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn aggregate_result_types() {
        let count = AggregateType::Count;
        assert_eq!(count.result_type(ColumnType::Utf8).unwrap(), ColumnType::Int64);
        assert_eq!(
            AggregateType::Avg.result_type(ColumnType::Float32).unwrap(),
            ColumnType::Float32
        );
        assert_eq!(
            AggregateType::Avg
                .result_type(ColumnType::Int32)
                .unwrap_err()
                .kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(
            AggregateType::Sum
                .result_type(ColumnType::Utf8)
                .unwrap_err()
                .kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(
            AggregateType::Max.result_type(ColumnType::Utf8).unwrap(),
            ColumnType::Utf8
        );
    }

    #[test]
    fn join_side_flags() {
        assert!(!JoinType::Inner.keeps_left() && !JoinType::Inner.keeps_right());
        assert!(JoinType::Left.keeps_left() && !JoinType::Left.keeps_right());
        assert!(JoinType::Full.keeps_left() && JoinType::Full.keeps_right());
    }
}
