//! Device enumeration and the context that owns it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::buffer::{DeviceBuffer, MemoryLedger};
use crate::backend::{self, Backend};
use crate::config::{AccelConfig, BackendKind};
use crate::error::{AccelError, AccelResult};

/// Upper bound on the device table.
pub const MAX_DEVICES: usize = 8;

/// Static description of one device. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: usize,
    pub name: String,
    /// Total memory in bytes
    pub total_memory: u64,
    pub compute_capability_major: u32,
    pub compute_capability_minor: u32,
    pub multi_processor_count: u32,
    pub max_threads_per_block: u32,
}

impl DeviceInfo {
    /// Descriptor of a simulated device.
    pub fn simulated(device_id: usize, total_memory: u64) -> Self {
        Self {
            device_id,
            name: format!("Simulated Device {device_id}"),
            total_memory,
            compute_capability_major: 8,
            compute_capability_minor: 0,
            multi_processor_count: 64,
            max_threads_per_block: 1024,
        }
    }

    pub fn compute_capability(&self) -> (u32, u32) {
        (self.compute_capability_major, self.compute_capability_minor)
    }
}

#[derive(Debug)]
struct DeviceSlot {
    info: DeviceInfo,
    ledger: Arc<MemoryLedger>,
}

/// Explicit replacement for process-wide accelerator state.
///
/// Built once from an [`AccelConfig`], which also fixes the backend for the
/// context's lifetime. `initialize` enumerates devices exactly once; every
/// other call fails `NotInitialized` until it has succeeded.
pub struct DeviceContext {
    config: AccelConfig,
    backend: Box<dyn Backend>,
    devices: RwLock<Option<Vec<DeviceSlot>>>,
}

impl DeviceContext {
    /// Build a context, selecting the backend named by `config`.
    ///
    /// A `Real` request with no reachable accelerator runtime silently
    /// downgrades to `Simulated`.
    pub fn new(config: AccelConfig) -> Self {
        let backend = backend::select(config.backend);
        Self {
            config,
            backend,
            devices: RwLock::new(None),
        }
    }

    /// Context configured from the process environment.
    pub fn from_env() -> AccelResult<Self> {
        Ok(Self::new(AccelConfig::from_env()?))
    }

    pub fn config(&self) -> &AccelConfig {
        &self.config
    }

    /// Backend actually serving calls (after any fallback).
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Enumerate devices and return how many there are.
    ///
    /// Idempotent: once initialized, returns the same count without
    /// re-enumerating. A failed attempt leaves the context uninitialized.
    pub fn initialize(&self) -> AccelResult<usize> {
        if let Some(devices) = self.devices.read().as_ref() {
            return Ok(devices.len());
        }

        let mut guard = self.devices.write();
        if let Some(devices) = guard.as_ref() {
            return Ok(devices.len());
        }

        let infos = self.enumerate()?;
        let slots: Vec<DeviceSlot> = infos
            .into_iter()
            .map(|info| {
                let capacity = usize::try_from(info.total_memory).unwrap_or(usize::MAX);
                DeviceSlot {
                    ledger: Arc::new(MemoryLedger::new(info.device_id, capacity)),
                    info,
                }
            })
            .collect();

        let count = slots.len();
        tracing::info!(target: "relaccel", devices = count, backend = self.backend.kind().as_str(), "device context initialized");
        *guard = Some(slots);
        Ok(count)
    }

    /// Resolve the device table: override, then backend enumeration, then a
    /// single simulated device.
    fn enumerate(&self) -> AccelResult<Vec<DeviceInfo>> {
        let memory = self.config.simulated_memory_bytes;

        if let Some(requested) = self.config.device_count_override {
            if requested <= 0 {
                return Err(AccelError::NoDeviceFound(requested));
            }
            let count = usize::try_from(requested).unwrap_or(usize::MAX);
            if count > MAX_DEVICES {
                tracing::warn!(target: "relaccel", requested, max = MAX_DEVICES, "device count override clamped");
            }
            return Ok((0..count.min(MAX_DEVICES))
                .map(|id| DeviceInfo::simulated(id, memory))
                .collect());
        }

        if let Some(mut devices) = self.backend.devices()? {
            if devices.is_empty() {
                return Err(AccelError::NoDeviceFound(0));
            }
            devices.truncate(MAX_DEVICES);
            return Ok(devices);
        }

        Ok(vec![DeviceInfo::simulated(0, memory)])
    }

    pub fn is_initialized(&self) -> bool {
        self.devices.read().is_some()
    }

    pub fn device_count(&self) -> AccelResult<usize> {
        self.devices
            .read()
            .as_ref()
            .map(Vec::len)
            .ok_or(AccelError::NotInitialized)
    }

    pub fn device_info(&self, device_id: usize) -> AccelResult<DeviceInfo> {
        let guard = self.devices.read();
        let devices = guard.as_ref().ok_or(AccelError::NotInitialized)?;
        devices
            .get(device_id)
            .map(|slot| slot.info.clone())
            .ok_or_else(|| invalid_device(device_id, devices.len()))
    }

    /// Bytes currently held by live buffers on `device_id`.
    pub fn memory_in_use(&self, device_id: usize) -> AccelResult<usize> {
        Ok(self.ledger(device_id)?.used())
    }

    /// Allocate a data region of `byte_size` bytes plus a count cell.
    ///
    /// Zero-byte requests succeed with an empty buffer.
    pub fn allocate(&self, device_id: usize, byte_size: usize) -> AccelResult<DeviceBuffer> {
        let ledger = self.ledger(device_id)?;
        let buffer = DeviceBuffer::allocate(&ledger, device_id, byte_size)?;
        tracing::debug!(target: "relaccel", device = device_id, bytes = byte_size, "buffer allocated");
        Ok(buffer)
    }

    /// Release a buffer. Safe to call any number of times.
    ///
    /// Buffers allocated by another context are left alone.
    pub fn release(&self, buffer: &mut DeviceBuffer) {
        if self.owns(buffer) {
            buffer.release();
        } else {
            tracing::warn!(target: "relaccel", device = buffer.device_id(), "release of a buffer owned by another context ignored");
        }
    }

    /// Whether `buffer` was allocated by this context. Released buffers keep
    /// their owner.
    pub fn owns(&self, buffer: &DeviceBuffer) -> bool {
        self.devices.read().as_ref().is_some_and(|devices| {
            devices
                .get(buffer.device_id())
                .is_some_and(|slot| buffer.is_owned_by(&slot.ledger))
        })
    }

    /// `NotInitialized` before initialize, `InvalidValue` for a buffer from
    /// another context.
    pub(crate) fn check_owned(&self, buffer: &DeviceBuffer) -> AccelResult<()> {
        self.ensure_initialized()?;
        if self.owns(buffer) {
            Ok(())
        } else {
            Err(AccelError::invalid(format!(
                "buffer on device {} was not allocated by this context",
                buffer.device_id()
            )))
        }
    }

    pub(crate) fn ensure_initialized(&self) -> AccelResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(AccelError::NotInitialized)
        }
    }

    fn ledger(&self, device_id: usize) -> AccelResult<Arc<MemoryLedger>> {
        let guard = self.devices.read();
        let devices = guard.as_ref().ok_or(AccelError::NotInitialized)?;
        devices
            .get(device_id)
            .map(|slot| Arc::clone(&slot.ledger))
            .ok_or_else(|| invalid_device(device_id, devices.len()))
    }
}

fn invalid_device(device_id: usize, count: usize) -> AccelError {
    AccelError::invalid(format!(
        "device {device_id} out of range (0..{count})"
    ))
}
