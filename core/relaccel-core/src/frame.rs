//! Host-side typed columnar frames.
//!
//! A [`HostFrame`] is what the upstream catalog hands us and what callers get
//! back after a copy-out: typed columns plus the [`ColumnLayout`] describing
//! their byte encoding. Frames convert to and from Arrow `RecordBatch`.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{AccelError, AccelResult};
use crate::layout::{ColumnLayout, ColumnSpec};
use crate::types::{ColumnType, DEFAULT_UTF8_WIDTH};

/// One decoded column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
}

macro_rules! decode_fixed {
    ($bytes:expr, $ty:ty, $variant:ident) => {{
        const W: usize = std::mem::size_of::<$ty>();
        let values = $bytes
            .chunks_exact(W)
            .map(|chunk| {
                let mut raw = [0u8; W];
                raw.copy_from_slice(chunk);
                <$ty>::from_ne_bytes(raw)
            })
            .collect();
        ColumnData::$variant(values)
    }};
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Int32(_) => ColumnType::Int32,
            ColumnData::Int64(_) => ColumnType::Int64,
            ColumnData::Float32(_) => ColumnType::Float32,
            ColumnData::Float64(_) => ColumnType::Float64,
            ColumnData::Utf8(_) => ColumnType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather rows by index, in the given order.
    pub fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Int32(v) => ColumnData::Int32(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Int64(v) => ColumnData::Int64(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Float32(v) => {
                ColumnData::Float32(indices.iter().map(|&i| v[i]).collect())
            }
            ColumnData::Float64(v) => {
                ColumnData::Float64(indices.iter().map(|&i| v[i]).collect())
            }
            ColumnData::Utf8(v) => ColumnData::Utf8(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Decode `rows` elements of `spec` from exactly `rows * spec.width` bytes.
    pub fn decode(bytes: &[u8], spec: &ColumnSpec, rows: usize) -> AccelResult<ColumnData> {
        if bytes.len() != rows * spec.width {
            return Err(AccelError::invalid(format!(
                "column needs {} bytes for {} rows, got {}",
                rows * spec.width,
                rows,
                bytes.len()
            )));
        }
        let column = match spec.column_type {
            ColumnType::Int32 => decode_fixed!(bytes, i32, Int32),
            ColumnType::Int64 => decode_fixed!(bytes, i64, Int64),
            ColumnType::Float32 => decode_fixed!(bytes, f32, Float32),
            ColumnType::Float64 => decode_fixed!(bytes, f64, Float64),
            ColumnType::Utf8 => {
                let mut values = Vec::with_capacity(rows);
                for slot in bytes.chunks_exact(spec.width) {
                    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
                    let s = std::str::from_utf8(&slot[..end])
                        .map_err(|e| AccelError::invalid(format!("utf8 slot: {e}")))?;
                    values.push(s.to_owned());
                }
                ColumnData::Utf8(values)
            }
        };
        Ok(column)
    }

    /// Append the encoded elements to `out`.
    pub fn encode_into(&self, spec: &ColumnSpec, out: &mut Vec<u8>) -> AccelResult<()> {
        if spec.column_type != self.column_type() {
            return Err(AccelError::invalid(format!(
                "cannot encode {} data as {}",
                self.column_type().as_str(),
                spec.column_type.as_str()
            )));
        }
        match self {
            ColumnData::Int32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_ne_bytes())),
            ColumnData::Int64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_ne_bytes())),
            ColumnData::Float32(v) => {
                v.iter().for_each(|x| out.extend_from_slice(&x.to_ne_bytes()))
            }
            ColumnData::Float64(v) => {
                v.iter().for_each(|x| out.extend_from_slice(&x.to_ne_bytes()))
            }
            ColumnData::Utf8(v) => {
                for s in v {
                    if s.len() > spec.width {
                        return Err(AccelError::invalid(format!(
                            "string of {} bytes exceeds slot width {}",
                            s.len(),
                            spec.width
                        )));
                    }
                    if s.as_bytes().contains(&0) {
                        return Err(AccelError::invalid("strings must not contain NUL"));
                    }
                    out.extend_from_slice(s.as_bytes());
                    out.resize(out.len() + spec.width - s.len(), 0);
                }
            }
        }
        Ok(())
    }
}

/// Typed columns with a shared row count and their byte layout.
#[derive(Debug, Clone, PartialEq)]
pub struct HostFrame {
    layout: ColumnLayout,
    columns: Vec<ColumnData>,
    rows: usize,
}

impl HostFrame {
    /// Build a frame, sizing string slots to fit the longest value
    /// (at least [`DEFAULT_UTF8_WIDTH`]).
    pub fn new(columns: Vec<ColumnData>) -> AccelResult<Self> {
        let specs: Vec<ColumnSpec> = columns
            .iter()
            .map(|c| match c {
                ColumnData::Utf8(v) => {
                    let longest = v.iter().map(String::len).max().unwrap_or(0);
                    ColumnSpec::utf8(longest.max(DEFAULT_UTF8_WIDTH))
                }
                other => ColumnSpec::new(other.column_type()),
            })
            .collect();
        Self::with_layout(ColumnLayout::new(specs)?, columns)
    }

    /// Build a frame against an explicit layout.
    pub fn with_layout(layout: ColumnLayout, columns: Vec<ColumnData>) -> AccelResult<Self> {
        if layout.len() != columns.len() {
            return Err(AccelError::invalid(format!(
                "layout has {} columns, frame has {}",
                layout.len(),
                columns.len()
            )));
        }
        let rows = columns.first().map(ColumnData::len).unwrap_or(0);
        for (spec, column) in layout.columns().iter().zip(&columns) {
            if spec.column_type != column.column_type() {
                return Err(AccelError::invalid(format!(
                    "layout expects {}, column is {}",
                    spec.column_type.as_str(),
                    column.column_type().as_str()
                )));
            }
            if column.len() != rows {
                return Err(AccelError::invalid("columns have different lengths"));
            }
        }
        Ok(Self {
            layout,
            columns,
            rows,
        })
    }

    /// Decode a frame of `rows` rows from a column-major byte region.
    pub fn decode(layout: &ColumnLayout, rows: usize, bytes: &[u8]) -> AccelResult<Self> {
        let needed = layout
            .required_bytes(rows)
            .ok_or_else(|| AccelError::invalid("row count overflows layout"))?;
        if bytes.len() < needed {
            return Err(AccelError::invalid(format!(
                "{rows} rows need {needed} bytes, region holds {}",
                bytes.len()
            )));
        }
        let columns = (0..layout.len())
            .map(|i| {
                let range = layout.column_range(i, rows)?;
                ColumnData::decode(&bytes[range], layout.column(i)?, rows)
            })
            .collect::<AccelResult<Vec<_>>>()?;
        Ok(Self {
            layout: layout.clone(),
            columns,
            rows,
        })
    }

    /// Column-major encoding of every row.
    pub fn encode(&self) -> AccelResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.byte_len());
        for (spec, column) in self.layout.columns().iter().zip(&self.columns) {
            column.encode_into(spec, &mut out)?;
        }
        Ok(out)
    }

    pub fn byte_len(&self) -> usize {
        self.rows * self.layout.row_width()
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> AccelResult<&ColumnData> {
        self.columns
            .get(index)
            .ok_or_else(|| AccelError::invalid(format!("column index {index} out of range")))
    }

    /// Gather rows by index, keeping the layout.
    pub fn take(&self, indices: &[usize]) -> HostFrame {
        HostFrame {
            layout: self.layout.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            rows: indices.len(),
        }
    }

    /// Convert an Arrow batch. Nullable columns with nulls are rejected.
    pub fn from_record_batch(batch: &RecordBatch) -> AccelResult<Self> {
        let columns = batch
            .columns()
            .iter()
            .map(|array| {
                if array.null_count() > 0 {
                    return Err(AccelError::unsupported("columns with nulls"));
                }
                column_from_arrow(array)
            })
            .collect::<AccelResult<Vec<_>>>()?;
        Self::new(columns)
    }

    /// Convert to an Arrow batch with columns named `c0`, `c1`, ...
    pub fn to_record_batch(&self) -> AccelResult<RecordBatch> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| Field::new(format!("c{i}"), arrow_type(c.column_type()), false))
            .collect();
        let arrays: Vec<ArrayRef> = self.columns.iter().map(column_to_arrow).collect();
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Int32 => DataType::Int32,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::Float32 => DataType::Float32,
        ColumnType::Float64 => DataType::Float64,
        ColumnType::Utf8 => DataType::Utf8,
    }
}

fn column_from_arrow(array: &ArrayRef) -> AccelResult<ColumnData> {
    fn downcast<T: 'static>(array: &ArrayRef) -> AccelResult<&T> {
        array
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| AccelError::invalid("arrow array does not match its data type"))
    }

    match array.data_type() {
        DataType::Int32 => Ok(ColumnData::Int32(
            downcast::<Int32Array>(array)?.values().to_vec(),
        )),
        DataType::Int64 => Ok(ColumnData::Int64(
            downcast::<Int64Array>(array)?.values().to_vec(),
        )),
        DataType::Float32 => Ok(ColumnData::Float32(
            downcast::<Float32Array>(array)?.values().to_vec(),
        )),
        DataType::Float64 => Ok(ColumnData::Float64(
            downcast::<Float64Array>(array)?.values().to_vec(),
        )),
        DataType::Utf8 => Ok(ColumnData::Utf8(
            downcast::<StringArray>(array)?
                .iter()
                .map(|s| s.unwrap_or_default().to_owned())
                .collect(),
        )),
        other => Err(AccelError::unsupported(format!(
            "arrow type {other:?} has no device encoding"
        ))),
    }
}

fn column_to_arrow(column: &ColumnData) -> ArrayRef {
    match column {
        ColumnData::Int32(v) => Arc::new(Int32Array::from(v.clone())),
        ColumnData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::Float32(v) => Arc::new(Float32Array::from(v.clone())),
        ColumnData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::Utf8(v) => Arc::new(StringArray::from(v.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> HostFrame {
        HostFrame::new(vec![
            ColumnData::Int32(vec![3, 1, 2]),
            ColumnData::Utf8(vec!["c".into(), "a".into(), "b".into()]),
            ColumnData::Float64(vec![0.5, -1.0, 2.25]),
        ])
        .unwrap()
    }

    #[test]
    fn encode_decode_frame() {
        let frame = sample();
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), 3 * (4 + DEFAULT_UTF8_WIDTH + 8));
        let decoded = HostFrame::decode(frame.layout(), 3, &bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn string_slots_are_padded() {
        let frame = HostFrame::new(vec![ColumnData::Utf8(vec!["ab".into()])]).unwrap();
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[..2], b"ab");
        assert!(bytes[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_oversized_strings() {
        let layout = ColumnLayout::new([ColumnSpec::utf8(2)]).unwrap();
        let frame =
            HostFrame::with_layout(layout, vec![ColumnData::Utf8(vec!["abc".into()])]).unwrap();
        assert_eq!(frame.encode().unwrap_err().kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = HostFrame::new(vec![
            ColumnData::Int32(vec![1, 2]),
            ColumnData::Int64(vec![1]),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn take_reorders_rows() {
        let taken = sample().take(&[2, 0]);
        assert_eq!(taken.row_count(), 2);
        assert_eq!(taken.column(0).unwrap(), &ColumnData::Int32(vec![2, 3]));
    }

    #[test]
    fn record_batch_round_trip() {
        let frame = sample();
        let batch = frame.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 3);
        let back = HostFrame::from_record_batch(&batch).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn record_batch_with_nulls_is_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from(vec![Some(1), None]))],
        )
        .unwrap();
        assert_eq!(
            HostFrame::from_record_batch(&batch).unwrap_err().kind(),
            ErrorKind::NotSupported
        );
    }
}
