//! # relaccel: accelerator-resident relational primitives
//!
//! Filter, join, aggregate, sort and group-by over columnar buffers that
//! live on a compute accelerator, or in host memory when none is present.
//! The simulated backend computes real results on the host, so the layers
//! above can be built and tested without hardware.
//!
//! ## Quick start
//!
//! ```rust
//! use relaccel_core::{
//!     AccelConfig, ColumnData, ColumnType, CompareOp, DeviceContext, HostFrame, ScalarValue,
//! };
//!
//! # fn main() -> relaccel_core::AccelResult<()> {
//! let ctx = DeviceContext::new(AccelConfig::default());
//! ctx.initialize()?;
//!
//! let frame = HostFrame::new(vec![ColumnData::Int64(vec![4, 8, 15, 16, 23, 42])])?;
//! let input = ctx.upload_frame(0, &frame)?;
//! let mut output = ctx.allocate(0, input.byte_size())?;
//!
//! ctx.filter(
//!     &input,
//!     &mut output,
//!     CompareOp::Ge,
//!     ColumnType::Int64,
//!     ScalarValue::Int64(15),
//!     None,
//! )?;
//! assert_eq!(output.row_count()?, 4);
//!
//! let result = ctx.download_frame(&output)?;
//! assert_eq!(result.column(0)?, &ColumnData::Int64(vec![15, 16, 23, 42]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`device`] - [`DeviceContext`], device table, buffers, transfers
//! - [`executor`] - operator entry points on `DeviceContext`
//! - [`backend`] - simulated and CUDA (`gpu` feature) backends
//! - [`frame`] / [`layout`] - typed host frames and their byte layout
//! - [`graphics`] - renderer buffer sharing boundary
//! - [`config`] - context configuration from code, JSON or environment
//! - [`error`] - error taxonomy with stable numeric codes

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod frame;
pub mod graphics;
pub mod layout;
pub mod types;

mod kernels;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use backend::{AggregateRequest, GroupByRequest, JoinRequest, Predicate, SortRequest};
pub use config::{AccelConfig, BackendKind};
pub use device::{DeviceBuffer, DeviceContext, DeviceInfo, MAX_DEVICES};
pub use error::{AccelError, AccelResult, ErrorKind, describe_code};
pub use frame::{ColumnData, HostFrame};
pub use kernels::join::ABSENT_ROW;
pub use layout::{ColumnLayout, ColumnSpec};
pub use types::{AggregateType, ColumnType, CompareOp, JoinType, ScalarValue};
