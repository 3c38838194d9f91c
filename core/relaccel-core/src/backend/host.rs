//! Host execution path shared by both backends.
//!
//! Inputs are decoded from their host-mirrored bytes into frames, the host
//! kernels compute the complete result, and only then is the output buffer
//! written (data, layout and count cell in one `commit`).

use super::{AggregateRequest, GroupByRequest, JoinRequest, Predicate, SortRequest};
use crate::device::DeviceBuffer;
use crate::error::{AccelError, AccelResult};
use crate::frame::{ColumnData, HostFrame};
use crate::kernels;
use crate::layout::{ColumnLayout, ColumnSpec};
use crate::types::{AggregateType, ColumnType};

/// Decode an input buffer. Without a recorded layout the buffer is read as
/// one column of `column_type`.
pub(super) fn load(buffer: &DeviceBuffer, column_type: ColumnType) -> AccelResult<HostFrame> {
    let layout = match buffer.layout() {
        Some(layout) => layout.clone(),
        None => ColumnLayout::single(column_type)?,
    };
    let rows = buffer.row_count()?;
    let needed = fitting_bytes(buffer, &layout, rows)?;
    HostFrame::decode(&layout, rows, &buffer.data()?[..needed])
}

fn fitting_bytes(buffer: &DeviceBuffer, layout: &ColumnLayout, rows: usize) -> AccelResult<usize> {
    layout
        .required_bytes(rows)
        .filter(|&n| n <= buffer.byte_size())
        .ok_or_else(|| {
            AccelError::invalid(format!(
                "row count {rows} exceeds the {}-byte data region",
                buffer.byte_size()
            ))
        })
}

/// Column `index` of `frame`, which must hold `column_type` values.
pub(super) fn typed_column(
    frame: &HostFrame,
    index: usize,
    column_type: ColumnType,
) -> AccelResult<&ColumnData> {
    let column = frame.column(index)?;
    if column.column_type() != column_type {
        return Err(AccelError::invalid(format!(
            "column {index} holds {}, call expects {}",
            column.column_type().as_str(),
            column_type.as_str()
        )));
    }
    Ok(column)
}

pub(super) fn store(output: &mut DeviceBuffer, frame: &HostFrame) -> AccelResult<()> {
    let bytes = frame.encode()?;
    output.commit(frame.layout().clone(), &bytes, frame.row_count())
}

/// Output spec for an aggregate of `input`; strings keep their slot width.
fn result_spec(input: &ColumnSpec, result_type: ColumnType) -> ColumnSpec {
    match result_type {
        ColumnType::Utf8 => ColumnSpec::utf8(input.width),
        other => ColumnSpec::new(other),
    }
}

pub(super) fn filter(
    input: &DeviceBuffer,
    output: &mut DeviceBuffer,
    predicate: &Predicate,
) -> AccelResult<()> {
    let frame = load(input, predicate.column_type)?;
    let column = typed_column(&frame, predicate.column, predicate.column_type)?;
    let rows = kernels::filter::select(
        column,
        predicate.op,
        &predicate.value,
        predicate.upper.as_ref(),
    )?;
    store(output, &frame.take(&rows))
}

pub(super) fn join(
    left: &DeviceBuffer,
    right: &DeviceBuffer,
    output: &mut DeviceBuffer,
    request: &JoinRequest,
) -> AccelResult<()> {
    let left_frame = load(left, request.column_type)?;
    let right_frame = load(right, request.column_type)?;
    let left_keys = typed_column(&left_frame, request.left_column, request.column_type)?;
    let right_keys = typed_column(&right_frame, request.right_column, request.column_type)?;

    let pairs = kernels::join::join(left_keys, right_keys, request.join_type);
    let layout = ColumnLayout::new([ColumnSpec::new(ColumnType::Int64); 2])?;
    store(output, &HostFrame::with_layout(layout, pairs.into_columns())?)
}

pub(super) fn aggregate(
    input: &DeviceBuffer,
    output: &mut DeviceBuffer,
    request: &AggregateRequest,
) -> AccelResult<()> {
    if request.agg == AggregateType::Count {
        return count_rows(input, output, request.column);
    }

    let result_type = request.agg.result_type(request.column_type)?;
    let frame = load(input, request.column_type)?;
    let column = typed_column(&frame, request.column, request.column_type)?;
    let spec = result_spec(frame.layout().column(request.column)?, result_type);

    // Empty MIN/MAX/AVG leave a zero-row result.
    let values: Vec<_> = kernels::aggregate::aggregate(column, request.agg)?
        .into_iter()
        .collect();
    let result = HostFrame::with_layout(
        ColumnLayout::new([spec])?,
        vec![kernels::scalars_to_column(result_type, values)?],
    )?;
    store(output, &result)
}

/// COUNT reads only the count cell, so the column's type never matters.
fn count_rows(input: &DeviceBuffer, output: &mut DeviceBuffer, column: usize) -> AccelResult<()> {
    let rows = input.row_count()?;
    match input.layout() {
        Some(layout) => {
            layout.column(column)?;
            fitting_bytes(input, layout, rows)?;
        }
        None if column != 0 => {
            return Err(AccelError::invalid(format!(
                "column index {column} out of range for a single-column buffer"
            )));
        }
        None => {}
    }
    let rows = i64::try_from(rows).map_err(|_| AccelError::invalid("row count exceeds int64"))?;
    store(output, &HostFrame::new(vec![ColumnData::Int64(vec![rows])])?)
}

pub(super) fn sort(
    input: &DeviceBuffer,
    output: &mut DeviceBuffer,
    request: &SortRequest,
) -> AccelResult<()> {
    let frame = load(input, request.column_type)?;
    let column = typed_column(&frame, request.column, request.column_type)?;
    let order = kernels::sort::sort_indices(column, request.ascending);
    store(output, &frame.take(&order))
}

pub(super) fn group_by(
    input: &DeviceBuffer,
    output: &mut DeviceBuffer,
    request: &GroupByRequest,
) -> AccelResult<()> {
    let frame = load(input, request.group_type)?;
    let keys = typed_column(&frame, request.group_column, request.group_type)?;
    let values = match request.agg {
        AggregateType::Count => frame.column(request.agg_column)?,
        _ => typed_column(&frame, request.agg_column, request.agg_type)?,
    };

    let groups = kernels::group_by::group_by(keys, values, request.agg)?;
    let key_spec = *frame.layout().column(request.group_column)?;
    let value_spec = result_spec(
        frame.layout().column(request.agg_column)?,
        groups.values.column_type(),
    );
    let layout = ColumnLayout::new([key_spec, value_spec])?;
    store(output, &HostFrame::with_layout(layout, vec![groups.keys, groups.values])?)
}
