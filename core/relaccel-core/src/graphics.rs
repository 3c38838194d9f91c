//! Graphics interop boundary.
//!
//! A renderer owns buffers the accelerator may read or write in place. The
//! [`GraphicsInterop`] trait covers their lifecycle: register, map, query
//! the mapped range, unmap, unregister. The memory itself always belongs to
//! the renderer; nothing here frees it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::device::DeviceContext;
use crate::error::{AccelError, AccelResult};

/// A renderer-owned buffer offered for sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalBuffer {
    /// Renderer's buffer name; 0 is reserved
    pub handle: u32,
    pub address: usize,
    pub len: usize,
}

/// Registration token returned by [`GraphicsInterop::register_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Address range visible to kernels while a resource is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRange {
    pub address: usize,
    pub len: usize,
}

pub trait GraphicsInterop: Send + Sync {
    fn register_buffer(&self, buffer: ExternalBuffer) -> AccelResult<ResourceHandle>;

    fn map_resources(&self, resource: ResourceHandle) -> AccelResult<()>;

    /// Only valid while mapped.
    fn mapped_pointer(&self, resource: ResourceHandle) -> AccelResult<MappedRange>;

    fn unmap_resources(&self, resource: ResourceHandle) -> AccelResult<()>;

    /// Forget a registration. Mapped resources must be unmapped first.
    fn unregister_resource(&self, resource: ResourceHandle) -> AccelResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceState {
    Registered,
    Mapped,
}

#[derive(Debug)]
struct Resource {
    buffer: ExternalBuffer,
    state: ResourceState,
}

/// Bookkeeping-only interop: tracks registered and mapped resources
/// against an initialized context and hands back the renderer's own range.
pub struct SimulatedGraphicsInterop {
    context: Arc<DeviceContext>,
    next_id: AtomicU64,
    resources: Mutex<AHashMap<u64, Resource>>,
}

impl SimulatedGraphicsInterop {
    pub fn new(context: Arc<DeviceContext>) -> Self {
        Self {
            context,
            next_id: AtomicU64::new(1),
            resources: Mutex::new(AHashMap::new()),
        }
    }

    /// Number of live registrations.
    pub fn registered(&self) -> usize {
        self.resources.lock().len()
    }

    fn with_resource<T>(
        &self,
        resource: ResourceHandle,
        f: impl FnOnce(&mut Resource) -> AccelResult<T>,
    ) -> AccelResult<T> {
        self.context.ensure_initialized()?;
        let mut resources = self.resources.lock();
        let entry = resources
            .get_mut(&resource.0)
            .ok_or_else(|| unknown(resource))?;
        f(entry)
    }
}

fn unknown(resource: ResourceHandle) -> AccelError {
    AccelError::invalid(format!("unknown graphics resource {}", resource.0))
}

impl GraphicsInterop for SimulatedGraphicsInterop {
    fn register_buffer(&self, buffer: ExternalBuffer) -> AccelResult<ResourceHandle> {
        self.context.ensure_initialized()?;
        if buffer.handle == 0 {
            return Err(AccelError::invalid("buffer name 0 cannot be registered"));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.resources.lock().insert(
            id,
            Resource {
                buffer,
                state: ResourceState::Registered,
            },
        );
        tracing::debug!(target: "relaccel", resource = id, handle = buffer.handle, "graphics buffer registered");
        Ok(ResourceHandle(id))
    }

    fn map_resources(&self, resource: ResourceHandle) -> AccelResult<()> {
        self.with_resource(resource, |r| match r.state {
            ResourceState::Registered => {
                r.state = ResourceState::Mapped;
                Ok(())
            }
            ResourceState::Mapped => Err(AccelError::invalid("resource is already mapped")),
        })
    }

    fn mapped_pointer(&self, resource: ResourceHandle) -> AccelResult<MappedRange> {
        self.with_resource(resource, |r| match r.state {
            ResourceState::Mapped => Ok(MappedRange {
                address: r.buffer.address,
                len: r.buffer.len,
            }),
            ResourceState::Registered => Err(AccelError::invalid("resource is not mapped")),
        })
    }

    fn unmap_resources(&self, resource: ResourceHandle) -> AccelResult<()> {
        self.with_resource(resource, |r| match r.state {
            ResourceState::Mapped => {
                r.state = ResourceState::Registered;
                Ok(())
            }
            ResourceState::Registered => Err(AccelError::invalid("resource is not mapped")),
        })
    }

    fn unregister_resource(&self, resource: ResourceHandle) -> AccelResult<()> {
        self.context.ensure_initialized()?;
        let mut resources = self.resources.lock();
        match resources.get(&resource.0).map(|r| r.state) {
            None => Err(unknown(resource)),
            Some(ResourceState::Mapped) => {
                Err(AccelError::invalid("unmap the resource before unregistering it"))
            }
            Some(ResourceState::Registered) => {
                resources.remove(&resource.0);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccelConfig;
    use crate::error::ErrorKind;

    fn interop() -> SimulatedGraphicsInterop {
        let ctx = DeviceContext::new(AccelConfig::default());
        ctx.initialize().unwrap();
        SimulatedGraphicsInterop::new(Arc::new(ctx))
    }

    fn buffer(bytes: &mut [u8]) -> ExternalBuffer {
        ExternalBuffer {
            handle: 7,
            address: bytes.as_mut_ptr() as usize,
            len: bytes.len(),
        }
    }

    #[test]
    fn full_lifecycle_returns_the_callers_range() {
        let mut backing = vec![0u8; 128];
        let gl = interop();
        let external = buffer(&mut backing);
        let res = gl.register_buffer(external).unwrap();
        gl.map_resources(res).unwrap();
        let range = gl.mapped_pointer(res).unwrap();
        assert_eq!((range.address, range.len), (external.address, 128));
        gl.unmap_resources(res).unwrap();
        gl.unregister_resource(res).unwrap();
        assert_eq!(gl.registered(), 0);
        // still owned by the caller
        backing[0] = 1;
    }

    #[test]
    fn pointer_requires_mapping() {
        let mut backing = [0u8; 16];
        let gl = interop();
        let res = gl.register_buffer(buffer(&mut backing)).unwrap();
        assert_eq!(
            gl.mapped_pointer(res).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn mapped_resource_cannot_be_unregistered() {
        let mut backing = [0u8; 16];
        let gl = interop();
        let res = gl.register_buffer(buffer(&mut backing)).unwrap();
        gl.map_resources(res).unwrap();
        assert!(gl.unregister_resource(res).is_err());
        assert_eq!(gl.registered(), 1);
    }

    #[test]
    fn uninitialized_context_is_rejected() {
        let gl = SimulatedGraphicsInterop::new(Arc::new(DeviceContext::new(AccelConfig::default())));
        let err = gl
            .register_buffer(ExternalBuffer {
                handle: 1,
                address: 0,
                len: 0,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }

    #[test]
    fn unknown_and_reserved_handles() {
        let gl = interop();
        assert!(gl.map_resources(ResourceHandle(99)).is_err());
        let reserved = ExternalBuffer {
            handle: 0,
            address: 0,
            len: 0,
        };
        assert_eq!(
            gl.register_buffer(reserved).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }
}
