//! Device registry, buffers and host↔device transfers.
//!
//! All three hang off [`DeviceContext`]: the registry state lives inside it,
//! buffers are allocated through it, and transfers are `impl DeviceContext`
//! blocks in `transfer`.

mod buffer;
mod registry;
mod transfer;

pub use buffer::{COUNT_CELL_BYTES, DeviceBuffer};
pub use registry::{DeviceContext, DeviceInfo, MAX_DEVICES};
