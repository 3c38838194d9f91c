//! Operator entry points.
//!
//! Every call validates the context and its buffers before any data is
//! read, then hands off to the backend exactly once. Backends compute the
//! whole result before writing the output buffer, so a failed call leaves
//! the output as it was.

use std::time::Instant;

use crate::backend::{AggregateRequest, GroupByRequest, JoinRequest, Predicate, SortRequest};
use crate::device::{DeviceBuffer, DeviceContext};
use crate::error::{AccelError, AccelResult};
use crate::types::{AggregateType, ColumnType, CompareOp, ScalarValue};

impl DeviceContext {
    /// Keep the rows whose column 0 satisfies `op`.
    ///
    /// `value2` is the upper bound for `Between` and ignored otherwise. The
    /// output receives the matching rows in input order, with the input's
    /// layout, and their count.
    pub fn filter(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        op: CompareOp,
        column_type: ColumnType,
        value: ScalarValue,
        value2: Option<ScalarValue>,
    ) -> AccelResult<()> {
        let predicate = Predicate::new(op, column_type, value, value2)?;
        self.filter_where(input, output, &predicate)
    }

    /// `filter` against any column of a multi-column buffer.
    pub fn filter_where(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        predicate: &Predicate,
    ) -> AccelResult<()> {
        self.check_buffers(&[input], output)?;
        let start = Instant::now();
        tracing::debug!(target: "relaccel", op = ?predicate.op, column = predicate.column, "filter start");
        self.backend().filter(input, output, predicate)?;
        tracing::debug!(target: "relaccel", selected = output.row_count()?, elapsed_us = start.elapsed().as_micros(), "filter complete");
        Ok(())
    }

    /// Equi-join `left` and `right` into `(left_row, right_row)` pairs.
    ///
    /// The output holds two Int64 columns; outer joins mark the missing side
    /// with `-1`. Pairs are ordered left-major with right rows ascending,
    /// followed by unmatched right rows for Right and Full joins.
    pub fn join(
        &self,
        left: &DeviceBuffer,
        right: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &JoinRequest,
    ) -> AccelResult<()> {
        self.check_buffers(&[left, right], output)?;
        let start = Instant::now();
        tracing::debug!(target: "relaccel", join_type = ?request.join_type, "join start");
        self.backend().join(left, right, output, request)?;
        tracing::debug!(target: "relaccel", rows = output.row_count()?, elapsed_us = start.elapsed().as_micros(), "join complete");
        Ok(())
    }

    /// Reduce one column to a scalar.
    ///
    /// COUNT yields Int64 regardless of `column_type`. MIN, MAX and AVG over
    /// zero rows write nothing and leave a count of 0; every other case
    /// writes one value and a count of 1.
    pub fn aggregate(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        agg: AggregateType,
        column_type: ColumnType,
        column: usize,
    ) -> AccelResult<()> {
        self.check_buffers(&[input], output)?;
        let request = AggregateRequest {
            agg,
            column_type,
            column,
        };
        let start = Instant::now();
        tracing::debug!(target: "relaccel", agg = ?agg, column, "aggregate start");
        self.backend().aggregate(input, output, &request)?;
        tracing::debug!(target: "relaccel", elapsed_us = start.elapsed().as_micros(), "aggregate complete");
        Ok(())
    }

    /// Stable sort of every row by `column`.
    pub fn sort(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        column_type: ColumnType,
        column: usize,
        ascending: bool,
    ) -> AccelResult<()> {
        self.check_buffers(&[input], output)?;
        let request = SortRequest {
            column_type,
            column,
            ascending,
        };
        let start = Instant::now();
        tracing::debug!(target: "relaccel", column, ascending, "sort start");
        self.backend().sort(input, output, &request)?;
        tracing::debug!(target: "relaccel", rows = output.row_count()?, elapsed_us = start.elapsed().as_micros(), "sort complete");
        Ok(())
    }

    /// Group rows by one column and aggregate another per group.
    ///
    /// The output holds `[key, aggregate]` with one row per distinct key in
    /// first-appearance order.
    pub fn group_by(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &GroupByRequest,
    ) -> AccelResult<()> {
        self.check_buffers(&[input], output)?;
        let start = Instant::now();
        tracing::debug!(target: "relaccel", group_column = request.group_column, agg = ?request.agg, "group_by start");
        self.backend().group_by(input, output, request)?;
        tracing::debug!(target: "relaccel", groups = output.row_count()?, elapsed_us = start.elapsed().as_micros(), "group_by complete");
        Ok(())
    }

    fn check_buffers(&self, inputs: &[&DeviceBuffer], output: &DeviceBuffer) -> AccelResult<()> {
        self.ensure_initialized()?;
        if inputs.iter().any(|b| b.is_released()) || output.is_released() {
            return Err(AccelError::invalid("operator called with a released buffer"));
        }
        for buffer in inputs.iter().copied().chain([output]) {
            self.check_owned(buffer)?;
        }
        let device = output.device_id();
        if let Some(other) = inputs.iter().find(|b| b.device_id() != device) {
            return Err(AccelError::invalid(format!(
                "buffers span devices {} and {device}",
                other.device_id()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{GroupByRequest, JoinRequest};
    use crate::config::AccelConfig;
    use crate::device::{DeviceBuffer, DeviceContext};
    use crate::error::ErrorKind;
    use crate::frame::{ColumnData, HostFrame};
    use crate::types::{AggregateType, ColumnType, CompareOp, JoinType, ScalarValue};

    fn ctx() -> DeviceContext {
        let ctx = DeviceContext::new(AccelConfig::default().with_device_count(2));
        ctx.initialize().unwrap();
        ctx
    }

    fn upload(ctx: &DeviceContext, columns: Vec<ColumnData>) -> DeviceBuffer {
        ctx.upload_frame(0, &HostFrame::new(columns).unwrap()).unwrap()
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let ctx = ctx();
        let input = upload(&ctx, vec![ColumnData::Int32(vec![5, 1, 7, 3])]);
        let mut output = ctx.allocate(0, input.byte_size()).unwrap();
        ctx.filter(
            &input,
            &mut output,
            CompareOp::Gt,
            ColumnType::Int32,
            ScalarValue::Int32(2),
            None,
        )
        .unwrap();
        let frame = ctx.download_frame(&output).unwrap();
        assert_eq!(frame.column(0).unwrap(), &ColumnData::Int32(vec![5, 7, 3]));
    }

    #[test]
    fn released_input_is_rejected() {
        let ctx = ctx();
        let mut input = upload(&ctx, vec![ColumnData::Int64(vec![1])]);
        let mut output = ctx.allocate(0, 64).unwrap();
        ctx.release(&mut input);
        let err = ctx
            .sort(&input, &mut output, ColumnType::Int64, 0, true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn buffers_must_share_a_device() {
        let ctx = ctx();
        let input = upload(&ctx, vec![ColumnData::Int64(vec![1])]);
        let mut output = ctx.allocate(1, 64).unwrap();
        let err = ctx
            .aggregate(&input, &mut output, AggregateType::Sum, ColumnType::Int64, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn uninitialized_context_is_rejected() {
        let live = ctx();
        let input = upload(&live, vec![ColumnData::Int64(vec![1])]);
        let mut output = live.allocate(0, 64).unwrap();
        let cold = DeviceContext::new(AccelConfig::default());
        let err = cold
            .sort(&input, &mut output, ColumnType::Int64, 0, true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }

    #[test]
    fn undersized_output_is_left_untouched() {
        let ctx = ctx();
        let input = upload(&ctx, vec![ColumnData::Int64(vec![3, 2, 1])]);
        let mut output = ctx.allocate(0, 8).unwrap();
        let err = ctx
            .sort(&input, &mut output, ColumnType::Int64, 0, true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert_eq!(output.row_count().unwrap(), 0);
        assert!(output.layout().is_none());
    }

    #[test]
    fn join_writes_index_pairs() {
        let ctx = ctx();
        let left = upload(&ctx, vec![ColumnData::Int32(vec![1, 2])]);
        let right = upload(&ctx, vec![ColumnData::Int32(vec![2, 3])]);
        let mut output = ctx.allocate(0, 4 * 16).unwrap();
        let request = JoinRequest {
            join_type: JoinType::Full,
            left_column: 0,
            right_column: 0,
            column_type: ColumnType::Int32,
        };
        ctx.join(&left, &right, &mut output, &request).unwrap();
        let frame = ctx.download_frame(&output).unwrap();
        assert_eq!(frame.column(0).unwrap(), &ColumnData::Int64(vec![0, 1, -1]));
        assert_eq!(frame.column(1).unwrap(), &ColumnData::Int64(vec![-1, 0, 1]));
    }

    #[test]
    fn group_by_counts_groups() {
        let ctx = ctx();
        let input = upload(
            &ctx,
            vec![
                ColumnData::Int32(vec![1, 2, 1, 3, 2]),
                ColumnData::Float64(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            ],
        );
        let mut output = ctx.allocate(0, 256).unwrap();
        let request = GroupByRequest {
            group_type: ColumnType::Int32,
            group_column: 0,
            agg: AggregateType::Sum,
            agg_type: ColumnType::Float64,
            agg_column: 1,
        };
        ctx.group_by(&input, &mut output, &request).unwrap();
        assert_eq!(output.row_count().unwrap(), 3);
        let frame = ctx.download_frame(&output).unwrap();
        assert_eq!(frame.column(1).unwrap(), &ColumnData::Float64(vec![4.0, 7.0, 4.0]));
    }
}
