//! Backend strategy: who executes an operator once the executor has
//! validated its arguments.
//!
//! [`SimulatedBackend`] computes every primitive with the host kernels over
//! the buffers' host-mirrored bytes. [`RealBackend`] (feature `gpu`) runs
//! numeric predicates on a CUDA device and stages everything else through the
//! same host kernels, so both backends return identical results.

mod host;
mod real;
mod simulated;

pub use real::RealBackend;
pub use simulated::SimulatedBackend;

use crate::config::BackendKind;
use crate::device::{DeviceBuffer, DeviceInfo};
use crate::error::{AccelError, AccelResult};
use crate::types::{AggregateType, ColumnType, CompareOp, JoinType, ScalarValue};

/// Row-wise predicate for `filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: usize,
    pub op: CompareOp,
    pub column_type: ColumnType,
    pub value: ScalarValue,
    /// Upper bound; present only for `Between`
    pub upper: Option<ScalarValue>,
}

impl Predicate {
    /// Predicate over column 0.
    ///
    /// `value2` is required for `Between` and ignored otherwise. Both
    /// values must carry `column_type`.
    pub fn new(
        op: CompareOp,
        column_type: ColumnType,
        value: ScalarValue,
        value2: Option<ScalarValue>,
    ) -> AccelResult<Self> {
        check_scalar(column_type, &value)?;
        let upper = match op {
            CompareOp::Between => {
                let upper = value2
                    .ok_or_else(|| AccelError::invalid("BETWEEN needs a second value"))?;
                check_scalar(column_type, &upper)?;
                Some(upper)
            }
            _ => None,
        };
        Ok(Self {
            column: 0,
            op,
            column_type,
            value,
            upper,
        })
    }

    pub fn on_column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }
}

fn check_scalar(column_type: ColumnType, value: &ScalarValue) -> AccelResult<()> {
    if value.column_type() == column_type {
        Ok(())
    } else {
        Err(AccelError::invalid(format!(
            "{} value given for a {} predicate",
            value.column_type().as_str(),
            column_type.as_str()
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    pub join_type: JoinType,
    pub left_column: usize,
    pub right_column: usize,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateRequest {
    pub agg: AggregateType,
    pub column_type: ColumnType,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortRequest {
    pub column_type: ColumnType,
    pub column: usize,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupByRequest {
    pub group_type: ColumnType,
    pub group_column: usize,
    pub agg: AggregateType,
    pub agg_type: ColumnType,
    pub agg_column: usize,
}

/// Executes validated operator calls.
///
/// Inputs are live buffers on one device; implementations must compute the
/// full result before writing `output`, and leave it untouched on error.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Devices this backend can see. `None` defers to the simulated table.
    fn devices(&self) -> AccelResult<Option<Vec<DeviceInfo>>> {
        Ok(None)
    }

    fn filter(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        predicate: &Predicate,
    ) -> AccelResult<()>;

    fn join(
        &self,
        left: &DeviceBuffer,
        right: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &JoinRequest,
    ) -> AccelResult<()>;

    fn aggregate(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &AggregateRequest,
    ) -> AccelResult<()>;

    fn sort(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &SortRequest,
    ) -> AccelResult<()>;

    fn group_by(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &GroupByRequest,
    ) -> AccelResult<()>;
}

/// Build the backend for `kind`. A real backend that cannot start degrades
/// to the simulated one.
pub(crate) fn select(kind: BackendKind) -> Box<dyn Backend> {
    match kind {
        BackendKind::Simulated => Box::new(SimulatedBackend),
        BackendKind::Real => match RealBackend::try_new() {
            Some(real) => Box::new(real),
            None => {
                tracing::warn!(target: "relaccel", "accelerator runtime unavailable, using simulated backend");
                Box::new(SimulatedBackend)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn between_requires_upper_bound() {
        let err = Predicate::new(
            CompareOp::Between,
            ColumnType::Int32,
            ScalarValue::Int32(1),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn upper_bound_is_ignored_outside_between() {
        let p = Predicate::new(
            CompareOp::Lt,
            ColumnType::Int64,
            ScalarValue::Int64(1),
            Some(ScalarValue::Utf8("ignored".into())),
        )
        .unwrap();
        assert!(p.upper.is_none());
    }

    #[test]
    fn scalar_type_must_match() {
        let err = Predicate::new(
            CompareOp::Eq,
            ColumnType::Float64,
            ScalarValue::Float32(1.0),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn simulated_selection() {
        assert_eq!(select(BackendKind::Simulated).kind(), BackendKind::Simulated);
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn real_request_falls_back_without_gpu_feature() {
        assert_eq!(select(BackendKind::Real).kind(), BackendKind::Simulated);
    }
}
