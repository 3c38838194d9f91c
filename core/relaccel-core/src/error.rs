//! Error types for relaccel.
//!
//! All public APIs return `AccelResult<T>`; library code does not panic.
//! Every [`AccelError`] maps onto one [`ErrorKind`], whose numeric codes are
//! stable across language bindings.

use std::ffi::CStr;

use thiserror::Error;

/// Stable error taxonomy. The discriminants are part of the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    Success = 0,
    NotInitialized = 1,
    NoDeviceFound = 2,
    MemoryAllocationFailed = 3,
    KernelLaunchFailed = 4,
    InvalidValue = 5,
    NotSupported = 6,
    Unknown = 999,
}

impl ErrorKind {
    /// Numeric code used across bindings.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a numeric code back to a kind. Unrecognized codes become `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ErrorKind::Success,
            1 => ErrorKind::NotInitialized,
            2 => ErrorKind::NoDeviceFound,
            3 => ErrorKind::MemoryAllocationFailed,
            4 => ErrorKind::KernelLaunchFailed,
            5 => ErrorKind::InvalidValue,
            6 => ErrorKind::NotSupported,
            _ => ErrorKind::Unknown,
        }
    }

    /// Human-readable text for this kind, NUL-terminated for C callers.
    pub fn describe_c(self) -> &'static CStr {
        match self {
            ErrorKind::Success => c"Success",
            ErrorKind::NotInitialized => c"Device context not initialized",
            ErrorKind::NoDeviceFound => c"No accelerator device found",
            ErrorKind::MemoryAllocationFailed => c"Memory allocation failed",
            ErrorKind::KernelLaunchFailed => c"Kernel launch failed",
            ErrorKind::InvalidValue => c"Invalid value",
            ErrorKind::NotSupported => c"Operation not supported",
            ErrorKind::Unknown => c"Unknown error",
        }
    }

    /// Human-readable text for this kind.
    pub fn describe(self) -> &'static str {
        // every text above is ASCII
        self.describe_c().to_str().unwrap_or("Unknown error")
    }
}

/// Describe a raw error code. Total over `i32`.
pub fn describe_code(code: i32) -> &'static str {
    ErrorKind::from_code(code).describe()
}

/// Unified error type for all relaccel operations.
#[derive(Debug, Error)]
pub enum AccelError {
    /// Called before `DeviceContext::initialize` succeeded
    #[error("device context not initialized")]
    NotInitialized,

    /// Device enumeration resolved to zero devices
    #[error("no accelerator device found (resolved count {0})")]
    NoDeviceFound(i64),

    /// Data region or count cell could not be obtained
    #[error("memory allocation failed on device {device_id}: requested {requested} bytes, {available} available")]
    MemoryAllocationFailed {
        device_id: usize,
        requested: usize,
        available: usize,
    },

    /// Device kernel could not be compiled, loaded or launched
    #[error("kernel launch failed: {0}")]
    KernelLaunchFailed(String),

    /// Argument or buffer state rejected by validation
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Combination the contract explicitly declines
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Anything else (driver errors without a better mapping)
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl AccelError {
    /// Stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccelError::NotInitialized => ErrorKind::NotInitialized,
            AccelError::NoDeviceFound(_) => ErrorKind::NoDeviceFound,
            AccelError::MemoryAllocationFailed { .. } => ErrorKind::MemoryAllocationFailed,
            AccelError::KernelLaunchFailed(_) => ErrorKind::KernelLaunchFailed,
            AccelError::InvalidValue(_) => ErrorKind::InvalidValue,
            AccelError::NotSupported(_) => ErrorKind::NotSupported,
            AccelError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AccelError::InvalidValue(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        AccelError::NotSupported(msg.into())
    }
}

/// Result type alias for all relaccel operations.
pub type AccelResult<T> = Result<T, AccelError>;

impl From<arrow::error::ArrowError> for AccelError {
    fn from(err: arrow::error::ArrowError) -> Self {
        AccelError::InvalidValue(format!("arrow: {err}"))
    }
}

impl From<serde_json::Error> for AccelError {
    fn from(err: serde_json::Error) -> Self {
        AccelError::InvalidValue(format!("config: {err}"))
    }
}

impl From<std::io::Error> for AccelError {
    fn from(err: std::io::Error) -> Self {
        AccelError::Unknown(format!("io: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::Success.code(), 0);
        assert_eq!(ErrorKind::NotInitialized.code(), 1);
        assert_eq!(ErrorKind::NoDeviceFound.code(), 2);
        assert_eq!(ErrorKind::MemoryAllocationFailed.code(), 3);
        assert_eq!(ErrorKind::KernelLaunchFailed.code(), 4);
        assert_eq!(ErrorKind::InvalidValue.code(), 5);
        assert_eq!(ErrorKind::NotSupported.code(), 6);
        assert_eq!(ErrorKind::Unknown.code(), 999);
    }

    #[test]
    fn code_round_trip() {
        for code in [0, 1, 2, 3, 4, 5, 6, 999] {
            assert_eq!(ErrorKind::from_code(code).code(), code);
        }
    }

    #[test]
    fn describe_is_total() {
        assert_eq!(describe_code(0), "Success");
        assert_eq!(describe_code(6), "Operation not supported");
        assert_eq!(describe_code(42), "Unknown error");
        assert_eq!(describe_code(-7), "Unknown error");
        assert_eq!(describe_code(i32::MAX), "Unknown error");
    }

    #[test]
    fn c_text_matches_describe() {
        for code in [0, 1, 2, 3, 4, 5, 6, 999] {
            let kind = ErrorKind::from_code(code);
            assert_eq!(kind.describe_c().to_str().unwrap(), kind.describe());
        }
    }

    #[test]
    fn error_display_allocation() {
        let err = AccelError::MemoryAllocationFailed {
            device_id: 1,
            requested: 64,
            available: 8,
        };
        assert_eq!(
            err.to_string(),
            "memory allocation failed on device 1: requested 64 bytes, 8 available"
        );
        assert_eq!(err.kind(), ErrorKind::MemoryAllocationFailed);
    }

    #[test]
    fn error_kind_mapping() {
        assert_eq!(AccelError::NotInitialized.kind(), ErrorKind::NotInitialized);
        assert_eq!(AccelError::NoDeviceFound(0).kind(), ErrorKind::NoDeviceFound);
        assert_eq!(AccelError::invalid("x").kind(), ErrorKind::InvalidValue);
        assert_eq!(AccelError::unsupported("x").kind(), ErrorKind::NotSupported);
        assert_eq!(
            AccelError::KernelLaunchFailed("x".into()).kind(),
            ErrorKind::KernelLaunchFailed
        );
    }

    #[test]
    fn accel_result_err() {
        let result: AccelResult<i32> = Err(AccelError::NotInitialized);
        assert!(result.is_err());
    }
}
