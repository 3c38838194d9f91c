//! relaccel C FFI Bindings
//!
//! C-compatible entry points over `relaccel-core`. Every function returns
//! one of the `RELACCEL_*` status codes; contexts and buffers are opaque
//! heap handles owned by the caller.

#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

use relaccel_core::{
    AccelConfig, AccelError, AccelResult, AggregateType, ColumnLayout, ColumnSpec, ColumnType,
    CompareOp, DeviceBuffer, DeviceContext, ErrorKind, GroupByRequest, JoinRequest, JoinType,
    ScalarValue,
};
use std::ffi::{CStr, c_void};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

/// Opaque handle to a device context
pub struct RelaccelContext {
    ctx: DeviceContext,
}

/// Opaque handle to a device buffer
pub struct RelaccelBuffer {
    buffer: DeviceBuffer,
}

/// Device descriptor filled by `relaccel_get_device_info`
#[repr(C)]
pub struct RelaccelDeviceInfo {
    pub device_id: c_int,
    pub name: [c_char; 256],
    pub total_memory: usize,
    pub compute_capability_major: c_int,
    pub compute_capability_minor: c_int,
    pub multi_processor_count: c_int,
    pub max_threads_per_block: c_int,
}

/// Status codes
pub const RELACCEL_SUCCESS: c_int = 0;
pub const RELACCEL_ERR_NOT_INITIALIZED: c_int = 1;
pub const RELACCEL_ERR_NO_DEVICE: c_int = 2;
pub const RELACCEL_ERR_ALLOCATION: c_int = 3;
pub const RELACCEL_ERR_KERNEL_LAUNCH: c_int = 4;
pub const RELACCEL_ERR_INVALID_VALUE: c_int = 5;
pub const RELACCEL_ERR_NOT_SUPPORTED: c_int = 6;
pub const RELACCEL_ERR_UNKNOWN: c_int = 999;

fn status(result: AccelResult<()>) -> c_int {
    match result {
        Ok(()) => RELACCEL_SUCCESS,
        Err(e) => e.kind().code(),
    }
}

/// True when `output` is also passed as one of `inputs`. Operators read
/// their inputs while writing the output, so one handle cannot be both.
fn aliases(output: *mut RelaccelBuffer, inputs: &[*const RelaccelBuffer]) -> bool {
    inputs.iter().any(|&input| ptr::eq(input, output.cast_const()))
}

fn index(value: c_int, what: &str) -> AccelResult<usize> {
    usize::try_from(value)
        .map_err(|_| AccelError::InvalidValue(format!("{what} must be non-negative, got {value}")))
}

/// Read a typed literal. Utf8 values are NUL-terminated strings.
unsafe fn read_scalar(column_type: ColumnType, value: *const c_void) -> AccelResult<ScalarValue> {
    if value.is_null() {
        return Err(AccelError::InvalidValue("null comparison value".into()));
    }
    let scalar = match column_type {
        ColumnType::Int32 => ScalarValue::Int32(value.cast::<i32>().read_unaligned()),
        ColumnType::Int64 => ScalarValue::Int64(value.cast::<i64>().read_unaligned()),
        ColumnType::Float32 => ScalarValue::Float32(value.cast::<f32>().read_unaligned()),
        ColumnType::Float64 => ScalarValue::Float64(value.cast::<f64>().read_unaligned()),
        ColumnType::Utf8 => {
            let s = CStr::from_ptr(value.cast::<c_char>())
                .to_str()
                .map_err(|_| AccelError::InvalidValue("comparison string is not UTF-8".into()))?;
            ScalarValue::Utf8(s.to_owned())
        }
    };
    Ok(scalar)
}

// ═══════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════

/// Create a context configured from the `RELACCEL_*` environment variables.
/// Returns null if the environment holds an invalid value.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_context_new() -> *mut RelaccelContext {
    match DeviceContext::from_env() {
        Ok(ctx) => Box::into_raw(Box::new(RelaccelContext { ctx })),
        Err(_) => ptr::null_mut(),
    }
}

/// Create a simulated context reporting `device_count` devices.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_context_new_with_devices(
    device_count: i64,
) -> *mut RelaccelContext {
    let config = AccelConfig::default().with_device_count(device_count);
    Box::into_raw(Box::new(RelaccelContext {
        ctx: DeviceContext::new(config),
    }))
}

/// Free a context. Buffers allocated from it stay valid until freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_context_free(ctx: *mut RelaccelContext) {
    if !ctx.is_null() {
        drop(Box::from_raw(ctx));
    }
}

/// Enumerate devices. `device_count` may be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_init(ctx: *mut RelaccelContext, device_count: *mut c_int) -> c_int {
    if ctx.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    match (*ctx).ctx.initialize() {
        Ok(count) => {
            if !device_count.is_null() {
                *device_count = c_int::try_from(count).unwrap_or(c_int::MAX);
            }
            RELACCEL_SUCCESS
        }
        Err(e) => e.kind().code(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_get_device_info(
    ctx: *mut RelaccelContext,
    device_id: c_int,
    info: *mut RelaccelDeviceInfo,
) -> c_int {
    if ctx.is_null() || info.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let result = index(device_id, "device id").and_then(|id| (*ctx).ctx.device_info(id));
    let device = match result {
        Ok(device) => device,
        Err(e) => return e.kind().code(),
    };

    let mut name = [0 as c_char; 256];
    for (dst, src) in name.iter_mut().zip(device.name.bytes().take(255)) {
        *dst = src as c_char;
    }
    let clamp = |v: u32| c_int::try_from(v).unwrap_or(c_int::MAX);
    *info = RelaccelDeviceInfo {
        device_id,
        name,
        total_memory: usize::try_from(device.total_memory).unwrap_or(usize::MAX),
        compute_capability_major: clamp(device.compute_capability_major),
        compute_capability_minor: clamp(device.compute_capability_minor),
        multi_processor_count: clamp(device.multi_processor_count),
        max_threads_per_block: clamp(device.max_threads_per_block),
    };
    RELACCEL_SUCCESS
}

// ═══════════════════════════════════════════════════════════════
// Buffers
// ═══════════════════════════════════════════════════════════════

/// Allocate `size` bytes on `device_id` and store the handle in `*buffer`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_allocate(
    ctx: *mut RelaccelContext,
    device_id: c_int,
    size: usize,
    buffer: *mut *mut RelaccelBuffer,
) -> c_int {
    if ctx.is_null() || buffer.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let result = index(device_id, "device id").and_then(|id| (*ctx).ctx.allocate(id, size));
    match result {
        Ok(allocated) => {
            *buffer = Box::into_raw(Box::new(RelaccelBuffer { buffer: allocated }));
            RELACCEL_SUCCESS
        }
        Err(e) => e.kind().code(),
    }
}

/// Release the buffer in `*buffer` and null the slot. Freeing an already
/// nulled slot succeeds; a buffer from another context is left in place.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_free(
    ctx: *mut RelaccelContext,
    buffer: *mut *mut RelaccelBuffer,
) -> c_int {
    if ctx.is_null() || buffer.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let handle = *buffer;
    if handle.is_null() {
        return RELACCEL_SUCCESS;
    }
    if !(*ctx).ctx.owns(&(*handle).buffer) {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let mut owned = Box::from_raw(handle);
    (*ctx).ctx.release(&mut owned.buffer);
    *buffer = ptr::null_mut();
    RELACCEL_SUCCESS
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_buffer_size(buffer: *const RelaccelBuffer, size: *mut usize) -> c_int {
    if buffer.is_null() || size.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    *size = (*buffer).buffer.byte_size();
    RELACCEL_SUCCESS
}

/// Describe the buffer's columns. `widths` may be null, in which case each
/// column takes its native width (32 bytes for strings).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_set_layout(
    buffer: *mut RelaccelBuffer,
    types: *const c_int,
    widths: *const usize,
    column_count: usize,
) -> c_int {
    if buffer.is_null() || types.is_null() || column_count == 0 {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let types = slice::from_raw_parts(types, column_count);
    let widths = (!widths.is_null()).then(|| slice::from_raw_parts(widths, column_count));

    let specs = types
        .iter()
        .enumerate()
        .map(|(i, &code)| {
            let column_type = ColumnType::try_from(code)?;
            Ok(match widths {
                Some(w) if column_type == ColumnType::Utf8 => ColumnSpec::utf8(w[i]),
                Some(w) => ColumnSpec {
                    column_type,
                    width: w[i],
                },
                None => ColumnSpec::new(column_type),
            })
        })
        .collect::<AccelResult<Vec<_>>>();
    status(specs.and_then(ColumnLayout::new).and_then(|layout| (*buffer).buffer.set_layout(layout)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_set_row_count(buffer: *mut RelaccelBuffer, rows: usize) -> c_int {
    if buffer.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    status((*buffer).buffer.set_row_count(rows))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_get_row_count(
    buffer: *const RelaccelBuffer,
    rows: *mut usize,
) -> c_int {
    if buffer.is_null() || rows.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    match (*buffer).buffer.row_count() {
        Ok(count) => {
            *rows = count;
            RELACCEL_SUCCESS
        }
        Err(e) => e.kind().code(),
    }
}

// ═══════════════════════════════════════════════════════════════
// Transfers
// ═══════════════════════════════════════════════════════════════

/// Copy `size` bytes from `host` into the start of `buffer`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_copy_to_device(
    ctx: *mut RelaccelContext,
    host: *const c_void,
    buffer: *mut RelaccelBuffer,
    size: usize,
) -> c_int {
    if ctx.is_null() || host.is_null() || buffer.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let host = slice::from_raw_parts(host.cast::<u8>(), size);
    status((*ctx).ctx.copy_to_device(host, &mut (*buffer).buffer, size))
}

/// Copy `size` bytes from the start of `buffer` into `host`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_copy_to_host(
    ctx: *mut RelaccelContext,
    buffer: *const RelaccelBuffer,
    host: *mut c_void,
    size: usize,
) -> c_int {
    if ctx.is_null() || host.is_null() || buffer.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let host = slice::from_raw_parts_mut(host.cast::<u8>(), size);
    status((*ctx).ctx.copy_to_host(&(*buffer).buffer, host, size))
}

// ═══════════════════════════════════════════════════════════════
// Operators
// ═══════════════════════════════════════════════════════════════

/// Filter on column 0. `value` points at a value of `data_type`; `value2`
/// is the upper bound for BETWEEN and may be null otherwise.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_execute_filter(
    ctx: *mut RelaccelContext,
    input: *const RelaccelBuffer,
    output: *mut RelaccelBuffer,
    op: c_int,
    data_type: c_int,
    value: *const c_void,
    value2: *const c_void,
) -> c_int {
    if ctx.is_null() || input.is_null() || output.is_null() || aliases(output, &[input]) {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let result = (|| {
        let op = CompareOp::try_from(op)?;
        let column_type = ColumnType::try_from(data_type)?;
        let value = read_scalar(column_type, value)?;
        let value2 = if value2.is_null() {
            None
        } else {
            Some(read_scalar(column_type, value2)?)
        };
        (*ctx).ctx.filter(
            &(*input).buffer,
            &mut (*output).buffer,
            op,
            column_type,
            value,
            value2,
        )
    })();
    status(result)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_execute_join(
    ctx: *mut RelaccelContext,
    left: *const RelaccelBuffer,
    right: *const RelaccelBuffer,
    output: *mut RelaccelBuffer,
    join_type: c_int,
    left_column: c_int,
    right_column: c_int,
    data_type: c_int,
) -> c_int {
    if ctx.is_null() || left.is_null() || right.is_null() || output.is_null() {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    if aliases(output, &[left, right]) {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let result = (|| {
        let request = JoinRequest {
            join_type: JoinType::try_from(join_type)?,
            left_column: index(left_column, "left join column")?,
            right_column: index(right_column, "right join column")?,
            column_type: ColumnType::try_from(data_type)?,
        };
        (*ctx).ctx.join(
            &(*left).buffer,
            &(*right).buffer,
            &mut (*output).buffer,
            &request,
        )
    })();
    status(result)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_execute_aggregate(
    ctx: *mut RelaccelContext,
    input: *const RelaccelBuffer,
    output: *mut RelaccelBuffer,
    op: c_int,
    data_type: c_int,
    column: c_int,
) -> c_int {
    if ctx.is_null() || input.is_null() || output.is_null() || aliases(output, &[input]) {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let result = (|| {
        (*ctx).ctx.aggregate(
            &(*input).buffer,
            &mut (*output).buffer,
            AggregateType::try_from(op)?,
            ColumnType::try_from(data_type)?,
            index(column, "column index")?,
        )
    })();
    status(result)
}

/// Sort ascending when `ascending` is non-zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_execute_sort(
    ctx: *mut RelaccelContext,
    input: *const RelaccelBuffer,
    output: *mut RelaccelBuffer,
    data_type: c_int,
    column: c_int,
    ascending: c_int,
) -> c_int {
    if ctx.is_null() || input.is_null() || output.is_null() || aliases(output, &[input]) {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let result = (|| {
        (*ctx).ctx.sort(
            &(*input).buffer,
            &mut (*output).buffer,
            ColumnType::try_from(data_type)?,
            index(column, "column index")?,
            ascending != 0,
        )
    })();
    status(result)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaccel_execute_group_by(
    ctx: *mut RelaccelContext,
    input: *const RelaccelBuffer,
    output: *mut RelaccelBuffer,
    group_type: c_int,
    group_column: c_int,
    agg_type: c_int,
    agg_column: c_int,
    agg_op: c_int,
) -> c_int {
    if ctx.is_null() || input.is_null() || output.is_null() || aliases(output, &[input]) {
        return RELACCEL_ERR_INVALID_VALUE;
    }
    let result = (|| {
        let request = GroupByRequest {
            group_type: ColumnType::try_from(group_type)?,
            group_column: index(group_column, "group column")?,
            agg: AggregateType::try_from(agg_op)?,
            agg_type: ColumnType::try_from(agg_type)?,
            agg_column: index(agg_column, "aggregate column")?,
        };
        (*ctx)
            .ctx
            .group_by(&(*input).buffer, &mut (*output).buffer, &request)
    })();
    status(result)
}

// ═══════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════

/// Static description of a status code. Never null; unknown codes map to
/// "Unknown error".
#[unsafe(no_mangle)]
pub extern "C" fn relaccel_error_string(code: c_int) -> *const c_char {
    ErrorKind::from_code(code).describe_c().as_ptr()
}
