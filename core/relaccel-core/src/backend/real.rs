//! CUDA backend.
//!
//! Numeric predicates run as a mask kernel on device 0; the mask comes back
//! and the selected rows are gathered on the host. Join, aggregate, sort,
//! group-by and string predicates stage through the host kernels.

#[cfg(feature = "gpu")]
use std::sync::Arc;

#[cfg(feature = "gpu")]
use cudarc::driver::{
    CudaContext, CudaModule, DeviceRepr, DriverError, LaunchConfig, PushKernelArg,
    sys::CUdevice_attribute,
};
#[cfg(feature = "gpu")]
use cudarc::nvrtc::compile_ptx;

use super::{
    AggregateRequest, Backend, GroupByRequest, JoinRequest, Predicate, SortRequest, host,
};
use crate::config::BackendKind;
use crate::device::{DeviceBuffer, DeviceInfo};
use crate::error::AccelResult;
#[cfg(feature = "gpu")]
use crate::error::AccelError;
#[cfg(feature = "gpu")]
use crate::frame::ColumnData;
#[cfg(feature = "gpu")]
use crate::types::{CompareOp, ScalarValue};

// op codes follow CompareOp; anything past Ge is BETWEEN
#[cfg(feature = "gpu")]
const FILTER_KERNELS_SRC: &str = r#"
#define DEFINE_FILTER_MASK(NAME, T)                                            \
extern "C" __global__ void NAME(const T* values, unsigned char* mask,          \
                                T lo, T hi, int op, int n) {                   \
    int i = blockIdx.x * blockDim.x + threadIdx.x;                             \
    if (i >= n) return;                                                        \
    T v = values[i];                                                           \
    bool keep;                                                                 \
    switch (op) {                                                              \
        case 0: keep = v == lo; break;                                         \
        case 1: keep = v != lo; break;                                         \
        case 2: keep = v < lo; break;                                          \
        case 3: keep = v <= lo; break;                                         \
        case 4: keep = v > lo; break;                                          \
        case 5: keep = v >= lo; break;                                         \
        default: keep = v >= lo && v <= hi; break;                             \
    }                                                                          \
    mask[i] = keep ? 1 : 0;                                                    \
}

DEFINE_FILTER_MASK(filter_mask_i32, int)
DEFINE_FILTER_MASK(filter_mask_i64, long long)
DEFINE_FILTER_MASK(filter_mask_f32, float)
DEFINE_FILTER_MASK(filter_mask_f64, double)
"#;

/// Backend driving a CUDA device through cudarc.
pub struct RealBackend {
    #[cfg(feature = "gpu")]
    ctx: Arc<CudaContext>,
    #[cfg(feature = "gpu")]
    module: Arc<CudaModule>,
}

impl RealBackend {
    /// Open device 0 and compile the predicate kernels. `None` when the
    /// `gpu` feature is off or no CUDA runtime is reachable.
    pub fn try_new() -> Option<Self> {
        #[cfg(feature = "gpu")]
        {
            let ctx = match CudaContext::new(0) {
                Ok(ctx) => ctx,
                Err(e) => {
                    tracing::warn!(target: "relaccel", error = ?e, "failed to open CUDA device 0");
                    return None;
                }
            };
            let ptx = match compile_ptx(FILTER_KERNELS_SRC) {
                Ok(ptx) => ptx,
                Err(e) => {
                    tracing::warn!(target: "relaccel", error = ?e, "failed to compile filter kernels");
                    return None;
                }
            };
            let module = match ctx.load_module(ptx) {
                Ok(module) => module,
                Err(e) => {
                    tracing::warn!(target: "relaccel", error = ?e, "failed to load filter kernels");
                    return None;
                }
            };
            tracing::info!(target: "relaccel", "CUDA backend ready");
            Some(Self { ctx, module })
        }
        #[cfg(not(feature = "gpu"))]
        {
            None
        }
    }
}

#[cfg(feature = "gpu")]
fn driver_error(what: &'static str) -> impl Fn(DriverError) -> AccelError {
    move |e| AccelError::KernelLaunchFailed(format!("{what}: {e:?}"))
}

#[cfg(feature = "gpu")]
impl RealBackend {
    fn enumerate(&self) -> AccelResult<Vec<DeviceInfo>> {
        let count = CudaContext::device_count()
            .map_err(|e| AccelError::Unknown(format!("device count: {e:?}")))?;
        let count = usize::try_from(count).unwrap_or(0);

        (0..count)
            .map(|ordinal| {
                let ctx = if ordinal == 0 {
                    Arc::clone(&self.ctx)
                } else {
                    CudaContext::new(ordinal).map_err(driver_error("open device"))?
                };
                let attr = |a: CUdevice_attribute| -> AccelResult<u32> {
                    let v = ctx.attribute(a).map_err(driver_error("device attribute"))?;
                    Ok(u32::try_from(v).unwrap_or(0))
                };
                // SAFETY: the handle belongs to a live context.
                let total_memory =
                    unsafe { cudarc::driver::result::device::total_mem(ctx.cu_device()) }
                        .map_err(driver_error("total memory"))?;
                Ok(DeviceInfo {
                    device_id: ordinal,
                    name: ctx.name().map_err(driver_error("device name"))?,
                    total_memory: total_memory as u64,
                    compute_capability_major: attr(
                        CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
                    )?,
                    compute_capability_minor: attr(
                        CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
                    )?,
                    multi_processor_count: attr(
                        CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT,
                    )?,
                    max_threads_per_block: attr(
                        CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK,
                    )?,
                })
            })
            .collect()
    }

    /// Predicate mask computed on the device. `None` for string columns.
    fn device_mask(
        &self,
        column: &ColumnData,
        predicate: &Predicate,
    ) -> AccelResult<Option<Vec<u8>>> {
        macro_rules! launch {
            ($values:expr, $variant:ident, $kernel:literal) => {{
                let ScalarValue::$variant(lo) = &predicate.value else {
                    return Ok(None);
                };
                let lo = *lo;
                let hi = match &predicate.upper {
                    Some(ScalarValue::$variant(hi)) => *hi,
                    _ => lo,
                };
                self.launch_mask($kernel, $values, lo, hi, predicate.op)?
            }};
        }

        let mask = match column {
            ColumnData::Int32(v) => launch!(v, Int32, "filter_mask_i32"),
            ColumnData::Int64(v) => launch!(v, Int64, "filter_mask_i64"),
            ColumnData::Float32(v) => launch!(v, Float32, "filter_mask_f32"),
            ColumnData::Float64(v) => launch!(v, Float64, "filter_mask_f64"),
            ColumnData::Utf8(_) => return Ok(None),
        };
        Ok(Some(mask))
    }

    fn launch_mask<T: DeviceRepr + Copy>(
        &self,
        kernel: &'static str,
        values: &[T],
        lo: T,
        hi: T,
        op: CompareOp,
    ) -> AccelResult<Vec<u8>> {
        let n = values.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let n_i32 = i32::try_from(n)
            .map_err(|_| AccelError::invalid(format!("{n} rows exceed one kernel launch")))?;
        let op_i32 = op as i32;

        let stream = self.ctx.default_stream();
        let func = self
            .module
            .load_function(kernel)
            .map_err(driver_error(kernel))?;
        let input = stream.clone_htod(values).map_err(driver_error("upload column"))?;
        let mut mask = stream
            .alloc_zeros::<u8>(n)
            .map_err(driver_error("allocate mask"))?;

        let mut builder = stream.launch_builder(&func);
        builder.arg(&input);
        builder.arg(&mut mask);
        builder.arg(&lo);
        builder.arg(&hi);
        builder.arg(&op_i32);
        builder.arg(&n_i32);
        // SAFETY: argument list matches DEFINE_FILTER_MASK's signature.
        unsafe { builder.launch(LaunchConfig::for_num_elems(n as u32)) }
            .map_err(driver_error(kernel))?;

        stream.clone_dtoh(&mask).map_err(driver_error("download mask"))
    }
}

impl Backend for RealBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Real
    }

    fn devices(&self) -> AccelResult<Option<Vec<DeviceInfo>>> {
        #[cfg(feature = "gpu")]
        {
            self.enumerate().map(Some)
        }
        #[cfg(not(feature = "gpu"))]
        {
            Ok(None)
        }
    }

    fn filter(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        predicate: &Predicate,
    ) -> AccelResult<()> {
        #[cfg(feature = "gpu")]
        {
            let frame = host::load(input, predicate.column_type)?;
            let column = host::typed_column(&frame, predicate.column, predicate.column_type)?;
            if let Some(mask) = self.device_mask(column, predicate)? {
                let rows = crate::kernels::filter::select_from_mask(&mask);
                tracing::debug!(target: "relaccel", rows = column.len(), selected = rows.len(), "device filter");
                return host::store(output, &frame.take(&rows));
            }
        }
        host::filter(input, output, predicate)
    }

    fn join(
        &self,
        left: &DeviceBuffer,
        right: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &JoinRequest,
    ) -> AccelResult<()> {
        host::join(left, right, output, request)
    }

    fn aggregate(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &AggregateRequest,
    ) -> AccelResult<()> {
        host::aggregate(input, output, request)
    }

    fn sort(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &SortRequest,
    ) -> AccelResult<()> {
        host::sort(input, output, request)
    }

    fn group_by(
        &self,
        input: &DeviceBuffer,
        output: &mut DeviceBuffer,
        request: &GroupByRequest,
    ) -> AccelResult<()> {
        host::group_by(input, output, request)
    }
}
