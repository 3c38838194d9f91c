//! Context configuration.
//!
//! Loaded once when a [`DeviceContext`](crate::DeviceContext) is built. Values
//! come from code, a JSON file, or the process environment:
//!
//! | variable                     | field                    |
//! |------------------------------|--------------------------|
//! | `RELACCEL_DEVICE_COUNT`      | `device_count_override`  |
//! | `RELACCEL_BACKEND`           | `backend`                |
//! | `RELACCEL_SIMULATED_MEMORY`  | `simulated_memory_bytes` |

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AccelError, AccelResult};

pub const ENV_DEVICE_COUNT: &str = "RELACCEL_DEVICE_COUNT";
pub const ENV_BACKEND: &str = "RELACCEL_BACKEND";
pub const ENV_SIMULATED_MEMORY: &str = "RELACCEL_SIMULATED_MEMORY";

/// 8 GiB per simulated device.
///
/// This is an accounting limit, not a reservation: buffers are mirrored in
/// zeroed host memory that the host commits only as bytes are written.
/// Lower it on hosts that cannot back what callers will actually fill.
pub const DEFAULT_SIMULATED_MEMORY: u64 = 8 * 1024 * 1024 * 1024;

/// Which backend serves operator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Device kernels; downgrades to `Simulated` when no accelerator runtime is reachable
    Real,
    /// Host-executed kernels over host-mirrored buffers
    #[default]
    Simulated,
}

impl BackendKind {
    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> AccelResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "real" | "gpu" | "cuda" => Ok(BackendKind::Real),
            "simulated" | "sim" | "cpu" => Ok(BackendKind::Simulated),
            _ => Err(AccelError::invalid(format!(
                "invalid backend '{s}'. Valid options: real, simulated"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Real => "real",
            BackendKind::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccelConfig {
    /// Forces the number of simulated devices reported by `initialize`.
    /// Values ≤ 0 make initialization fail with `NoDeviceFound`.
    pub device_count_override: Option<i64>,

    pub backend: BackendKind,

    /// Memory capacity of each simulated device, checked by `allocate`
    /// before any host memory is requested.
    pub simulated_memory_bytes: u64,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            device_count_override: None,
            backend: BackendKind::default(),
            simulated_memory_bytes: DEFAULT_SIMULATED_MEMORY,
        }
    }
}

impl AccelConfig {
    pub fn with_device_count(mut self, count: i64) -> Self {
        self.device_count_override = Some(count);
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_simulated_memory(mut self, bytes: u64) -> Self {
        self.simulated_memory_bytes = bytes;
        self
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> AccelResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup` (keys are the `ENV_*` names).
    pub fn from_lookup<F>(lookup: F) -> AccelResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_DEVICE_COUNT) {
            let count = raw.trim().parse::<i64>().map_err(|_| {
                AccelError::invalid(format!("{ENV_DEVICE_COUNT}='{raw}' is not an integer"))
            })?;
            config.device_count_override = Some(count);
        }
        if let Some(raw) = lookup(ENV_BACKEND) {
            config.backend = BackendKind::parse(&raw)?;
        }
        if let Some(raw) = lookup(ENV_SIMULATED_MEMORY) {
            config.simulated_memory_bytes = raw.trim().parse::<u64>().map_err(|_| {
                AccelError::invalid(format!("{ENV_SIMULATED_MEMORY}='{raw}' is not a byte count"))
            })?;
        }
        Ok(config)
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> AccelResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn to_json(&self) -> AccelResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
