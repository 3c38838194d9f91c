//! Column layout of a buffer's bytes.
//!
//! Buffers are column-major: column `i` starts at `rows * sum(width[0..i])`
//! and holds `rows` fixed-width elements. Numeric elements use native byte
//! order; string elements are NUL-padded UTF-8 slots.

use std::ops::Range;

use smallvec::SmallVec;

use crate::error::{AccelError, AccelResult};
use crate::types::{ColumnType, DEFAULT_UTF8_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub column_type: ColumnType,
    /// Element width in bytes
    pub width: usize,
}

impl ColumnSpec {
    /// Spec with the native width, or the default slot width for strings.
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            width: column_type.native_width().unwrap_or(DEFAULT_UTF8_WIDTH),
        }
    }

    pub fn utf8(width: usize) -> Self {
        Self {
            column_type: ColumnType::Utf8,
            width,
        }
    }

    fn validate(&self) -> AccelResult<()> {
        match self.column_type.native_width() {
            Some(native) if native != self.width => Err(AccelError::invalid(format!(
                "{} column must be {} bytes wide, got {}",
                self.column_type.as_str(),
                native,
                self.width
            ))),
            None if self.width == 0 => Err(AccelError::invalid("utf8 slot width must be > 0")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: SmallVec<[ColumnSpec; 4]>,
}

impl ColumnLayout {
    pub fn new(columns: impl IntoIterator<Item = ColumnSpec>) -> AccelResult<Self> {
        let columns: SmallVec<[ColumnSpec; 4]> = columns.into_iter().collect();
        if columns.is_empty() {
            return Err(AccelError::invalid("layout needs at least one column"));
        }
        for spec in &columns {
            spec.validate()?;
        }
        Ok(Self { columns })
    }

    /// Layout of a bare buffer holding one column of `column_type`.
    pub fn single(column_type: ColumnType) -> AccelResult<Self> {
        if column_type == ColumnType::Utf8 {
            return Err(AccelError::invalid(
                "utf8 buffers need an explicit layout with a slot width",
            ));
        }
        Self::new([ColumnSpec::new(column_type)])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> AccelResult<&ColumnSpec> {
        self.columns.get(index).ok_or_else(|| {
            AccelError::invalid(format!(
                "column index {index} out of range for {} columns",
                self.columns.len()
            ))
        })
    }

    /// Bytes per row across all columns.
    pub fn row_width(&self) -> usize {
        self.columns.iter().map(|c| c.width).sum()
    }

    /// Bytes needed to hold `rows` rows, or `None` on overflow.
    pub fn required_bytes(&self, rows: usize) -> Option<usize> {
        rows.checked_mul(self.row_width())
    }

    /// Byte range of column `index` when the buffer holds `rows` rows.
    pub fn column_range(&self, index: usize, rows: usize) -> AccelResult<Range<usize>> {
        let spec = self.column(index)?;
        let preceding: usize = self.columns[..index].iter().map(|c| c.width).sum();
        let start = rows
            .checked_mul(preceding)
            .ok_or_else(|| AccelError::invalid("row count overflows layout"))?;
        let len = rows
            .checked_mul(spec.width)
            .ok_or_else(|| AccelError::invalid("row count overflows layout"))?;
        Ok(start..start + len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn column_major_offsets() {
        let layout = ColumnLayout::new([
            ColumnSpec::new(ColumnType::Int32),
            ColumnSpec::utf8(16),
            ColumnSpec::new(ColumnType::Float64),
        ])
        .unwrap();
        assert_eq!(layout.row_width(), 28);
        assert_eq!(layout.column_range(0, 10).unwrap(), 0..40);
        assert_eq!(layout.column_range(1, 10).unwrap(), 40..200);
        assert_eq!(layout.column_range(2, 10).unwrap(), 200..280);
        assert_eq!(layout.required_bytes(10), Some(280));
    }

    #[test]
    fn rejects_bad_specs() {
        let bad_width = ColumnSpec {
            column_type: ColumnType::Int64,
            width: 4,
        };
        assert_eq!(
            ColumnLayout::new([bad_width]).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
        assert!(ColumnLayout::new([ColumnSpec::utf8(0)]).is_err());
        assert!(ColumnLayout::new(Vec::new()).is_err());
        assert!(ColumnLayout::single(ColumnType::Utf8).is_err());
    }

    #[test]
    fn out_of_range_column() {
        let layout = ColumnLayout::single(ColumnType::Int32).unwrap();
        assert_eq!(
            layout.column(1).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }
}
