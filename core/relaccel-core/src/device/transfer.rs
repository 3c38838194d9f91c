//! Host↔device copies.
//!
//! Copies are synchronous and all-or-nothing: every check runs before the
//! destination is touched.

use super::buffer::DeviceBuffer;
use super::registry::DeviceContext;
use crate::error::{AccelError, AccelResult};
use crate::frame::HostFrame;

impl DeviceContext {
    /// Copy the first `size` bytes of `host` into the start of `buffer`.
    pub fn copy_to_device(
        &self,
        host: &[u8],
        buffer: &mut DeviceBuffer,
        size: usize,
    ) -> AccelResult<()> {
        self.ensure_initialized()?;
        check_copy(buffer, host.len(), size)?;
        self.check_owned(buffer)?;
        buffer.data_mut()?[..size].copy_from_slice(&host[..size]);
        tracing::debug!(target: "relaccel", device = buffer.device_id(), bytes = size, "copy to device");
        Ok(())
    }

    /// Copy the first `size` bytes of `buffer` into the start of `host`.
    pub fn copy_to_host(
        &self,
        buffer: &DeviceBuffer,
        host: &mut [u8],
        size: usize,
    ) -> AccelResult<()> {
        self.ensure_initialized()?;
        check_copy(buffer, host.len(), size)?;
        self.check_owned(buffer)?;
        host[..size].copy_from_slice(&buffer.data()?[..size]);
        tracing::debug!(target: "relaccel", device = buffer.device_id(), bytes = size, "copy to host");
        Ok(())
    }

    /// Allocate a buffer sized for `frame`, copy it in, and record its layout
    /// and row count.
    pub fn upload_frame(&self, device_id: usize, frame: &HostFrame) -> AccelResult<DeviceBuffer> {
        let bytes = frame.encode()?;
        let mut buffer = self.allocate(device_id, bytes.len())?;
        self.copy_to_device(&bytes, &mut buffer, bytes.len())?;
        buffer.set_layout(frame.layout().clone())?;
        buffer.set_row_count(frame.row_count())?;
        Ok(buffer)
    }

    /// Copy out the rows recorded in `buffer`'s count cell, decoded per its
    /// layout.
    pub fn download_frame(&self, buffer: &DeviceBuffer) -> AccelResult<HostFrame> {
        self.check_owned(buffer)?;
        let layout = buffer
            .layout()
            .cloned()
            .ok_or_else(|| AccelError::invalid("buffer has no column layout"))?;
        let rows = buffer.row_count()?;
        let size = layout
            .required_bytes(rows)
            .filter(|&n| n <= buffer.byte_size())
            .ok_or_else(|| {
                AccelError::invalid(format!("{rows} rows do not fit the buffer's data region"))
            })?;
        let mut host = vec![0u8; size];
        self.copy_to_host(buffer, &mut host, size)?;
        HostFrame::decode(&layout, rows, &host)
    }
}

fn check_copy(buffer: &DeviceBuffer, host_len: usize, size: usize) -> AccelResult<()> {
    if buffer.is_released() {
        return Err(AccelError::invalid("buffer has been released"));
    }
    if size > buffer.byte_size() {
        return Err(AccelError::invalid(format!(
            "copy of {size} bytes exceeds buffer size {}",
            buffer.byte_size()
        )));
    }
    if size > host_len {
        return Err(AccelError::invalid(format!(
            "copy of {size} bytes exceeds host region of {host_len}"
        )));
    }
    Ok(())
}
