//! Owning handles to device memory.
//!
//! A [`DeviceBuffer`] owns a data region and a count cell. Both are acquired
//! against the owning device's [`MemoryLedger`] through RAII reservations, so
//! dropping either part (on release, on scope exit, or on a failed second
//! step of `allocate`) returns its bytes to the device.

use std::alloc::{self, Layout};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AccelError, AccelResult};
use crate::layout::ColumnLayout;

/// Bytes charged to the device for a buffer's count cell.
pub const COUNT_CELL_BYTES: usize = std::mem::size_of::<u64>();

/// Per-device memory accounting.
#[derive(Debug)]
pub(crate) struct MemoryLedger {
    device_id: usize,
    capacity: usize,
    used: AtomicUsize,
}

impl MemoryLedger {
    pub(crate) fn new(device_id: usize, capacity: usize) -> Self {
        Self {
            device_id,
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    pub(crate) fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    fn try_acquire(&self, bytes: usize) -> bool {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = match cur.checked_add(bytes) {
                Some(next) if next <= self.capacity => next,
                _ => return false,
            };
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }

    fn exhausted(&self, requested: usize) -> AccelError {
        AccelError::MemoryAllocationFailed {
            device_id: self.device_id,
            requested,
            available: self.available(),
        }
    }
}

/// Bytes held against a ledger; returned on drop.
#[derive(Debug)]
struct Reservation {
    ledger: Arc<MemoryLedger>,
    bytes: usize,
}

impl Reservation {
    fn acquire(ledger: &Arc<MemoryLedger>, bytes: usize) -> AccelResult<Self> {
        if !ledger.try_acquire(bytes) {
            return Err(ledger.exhausted(bytes));
        }
        Ok(Self {
            ledger: Arc::clone(ledger),
            bytes,
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.ledger.release(self.bytes);
    }
}

/// Zeroed host mirror of `len` bytes, or `None` if the host cannot supply it.
///
/// Goes through `alloc_zeroed`, so large regions are not touched page by
/// page up front; the host commits memory as bytes are written.
fn try_alloc_zeroed(len: usize) -> Option<Vec<u8>> {
    if len == 0 {
        return Some(Vec::new());
    }
    let layout = Layout::array::<u8>(len).ok()?;
    // SAFETY: `layout` has a non-zero size.
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        return None;
    }
    // SAFETY: `ptr` was allocated by the global allocator with `layout`,
    // i.e. `len` zero-initialized bytes with the alignment of `u8`.
    Some(unsafe { Vec::from_raw_parts(ptr, len, len) })
}

#[derive(Debug)]
struct Region {
    data: Vec<u8>,
    count: Vec<u64>,
    // Field order matters: memory goes before its reservation is returned.
    _data_reservation: Reservation,
    _count_reservation: Reservation,
}

/// Device-resident memory plus a result-count cell.
///
/// Move-only. Either fully allocated or fully released; `release` is
/// idempotent and dropping the handle releases it.
#[derive(Debug)]
pub struct DeviceBuffer {
    /// Ledger of the device this buffer was allocated on; never changes
    owner: Arc<MemoryLedger>,
    device_id: usize,
    byte_size: usize,
    region: Option<Region>,
    layout: Option<ColumnLayout>,
}

impl DeviceBuffer {
    pub(crate) fn allocate(
        ledger: &Arc<MemoryLedger>,
        device_id: usize,
        byte_size: usize,
    ) -> AccelResult<Self> {
        let data_reservation = Reservation::acquire(ledger, byte_size)?;
        let data = try_alloc_zeroed(byte_size).ok_or_else(|| ledger.exhausted(byte_size))?;

        // On failure below, `data` and its reservation are dropped here.
        let count_reservation = Reservation::acquire(ledger, COUNT_CELL_BYTES)?;
        let count = vec![0u64; 1];

        Ok(Self {
            owner: Arc::clone(ledger),
            device_id,
            byte_size,
            region: Some(Region {
                data,
                count,
                _data_reservation: data_reservation,
                _count_reservation: count_reservation,
            }),
            layout: None,
        })
    }

    /// Free the data region and count cell. No-op when already released.
    pub fn release(&mut self) {
        if self.region.take().is_some() {
            tracing::debug!(target: "relaccel", device = self.device_id, bytes = self.byte_size, "buffer released");
        }
        self.byte_size = 0;
        self.layout = None;
    }

    pub fn is_released(&self) -> bool {
        self.region.is_none()
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Whether this buffer was allocated against `ledger`.
    pub(crate) fn is_owned_by(&self, ledger: &Arc<MemoryLedger>) -> bool {
        Arc::ptr_eq(&self.owner, ledger)
    }

    /// Allocated size of the data region; 0 once released.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn layout(&self) -> Option<&ColumnLayout> {
        self.layout.as_ref()
    }

    /// Describe how the data region's bytes are laid out.
    pub fn set_layout(&mut self, layout: ColumnLayout) -> AccelResult<()> {
        self.region()?;
        self.layout = Some(layout);
        Ok(())
    }

    pub fn clear_layout(&mut self) {
        self.layout = None;
    }

    /// Value of the count cell: the row count of an input, or the number of
    /// rows an operator wrote into an output.
    pub fn row_count(&self) -> AccelResult<usize> {
        let count = self.region()?.count[0];
        usize::try_from(count).map_err(|_| AccelError::invalid("row count exceeds usize"))
    }

    pub fn set_row_count(&mut self, rows: usize) -> AccelResult<()> {
        self.region_mut()?.count[0] = rows as u64;
        Ok(())
    }

    pub(crate) fn data(&self) -> AccelResult<&[u8]> {
        Ok(&self.region()?.data)
    }

    pub(crate) fn data_mut(&mut self) -> AccelResult<&mut [u8]> {
        Ok(&mut self.region_mut()?.data)
    }

    /// Install an operator result: bytes, layout and row count together.
    pub(crate) fn commit(
        &mut self,
        layout: ColumnLayout,
        bytes: &[u8],
        rows: usize,
    ) -> AccelResult<()> {
        if bytes.len() > self.byte_size {
            return Err(AccelError::invalid(format!(
                "result needs {} bytes, output buffer holds {}",
                bytes.len(),
                self.byte_size
            )));
        }
        let region = self.region_mut()?;
        region.data[..bytes.len()].copy_from_slice(bytes);
        region.count[0] = rows as u64;
        self.layout = Some(layout);
        Ok(())
    }

    fn region(&self) -> AccelResult<&Region> {
        self.region
            .as_ref()
            .ok_or_else(|| AccelError::invalid("buffer has been released"))
    }

    fn region_mut(&mut self) -> AccelResult<&mut Region> {
        self.region
            .as_mut()
            .ok_or_else(|| AccelError::invalid("buffer has been released"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::ColumnType;

    fn ledger(capacity: usize) -> Arc<MemoryLedger> {
        Arc::new(MemoryLedger::new(0, capacity))
    }

    #[test]
    fn allocate_charges_data_and_count_cell() {
        let ledger = ledger(1024);
        let buffer = DeviceBuffer::allocate(&ledger, 0, 100).unwrap();
        assert_eq!(ledger.used(), 100 + COUNT_CELL_BYTES);
        assert_eq!(buffer.byte_size(), 100);
        assert_eq!(buffer.row_count().unwrap(), 0);
        drop(buffer);
        assert_eq!(ledger.used(), 0);
    }

    #[test]
    fn release_is_idempotent() {
        let ledger = ledger(1024);
        let mut buffer = DeviceBuffer::allocate(&ledger, 0, 64).unwrap();
        buffer.release();
        buffer.release();
        assert!(buffer.is_released());
        assert_eq!(buffer.byte_size(), 0);
        assert_eq!(ledger.used(), 0);
        assert_eq!(buffer.row_count().unwrap_err().kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn data_region_failure_allocates_nothing() {
        let ledger = ledger(32);
        let err = DeviceBuffer::allocate(&ledger, 0, 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryAllocationFailed);
        assert_eq!(ledger.used(), 0);
    }

    #[test]
    fn count_cell_failure_unwinds_data_region() {
        // Data region fits exactly; the count cell does not.
        let ledger = ledger(64);
        let err = DeviceBuffer::allocate(&ledger, 0, 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryAllocationFailed);
        assert_eq!(ledger.used(), 0);
    }

    #[test]
    fn ownership_follows_the_allocating_ledger() {
        let (home, other) = (ledger(1024), ledger(1024));
        let mut buffer = DeviceBuffer::allocate(&home, 0, 16).unwrap();
        assert!(buffer.is_owned_by(&home));
        assert!(!buffer.is_owned_by(&other));
        buffer.release();
        assert!(buffer.is_owned_by(&home));
    }

    #[test]
    fn large_zeroed_region_reads_back_zero() {
        let ledger = ledger(1 << 30);
        let buffer = DeviceBuffer::allocate(&ledger, 0, 64 << 20).unwrap();
        let data = buffer.data().unwrap();
        assert_eq!(data.len(), 64 << 20);
        assert!(data.iter().step_by(4096).all(|&b| b == 0));
    }

    #[test]
    fn commit_checks_capacity_first() {
        let ledger = ledger(1024);
        let mut buffer = DeviceBuffer::allocate(&ledger, 0, 4).unwrap();
        let layout = ColumnLayout::single(ColumnType::Int64).unwrap();
        let err = buffer.commit(layout, &[0u8; 8], 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert!(buffer.layout().is_none());
        assert_eq!(buffer.row_count().unwrap(), 0);
    }

    #[test]
    fn set_layout_on_released_buffer_fails() {
        let ledger = ledger(1024);
        let mut buffer = DeviceBuffer::allocate(&ledger, 0, 4).unwrap();
        buffer.release();
        let layout = ColumnLayout::single(ColumnType::Int32).unwrap();
        assert!(buffer.set_layout(layout).is_err());
    }
}
