//! Logging utilities for relaccel
//!
//! Library code only emits `tracing` events under the `relaccel` target;
//! nothing is printed unless a subscriber is installed, either by the
//! embedding application or through the helpers here (feature `logging`).
//!
//! The filter comes from `RELACCEL_LOG`, then `RUST_LOG`, then the level
//! passed in. Installing twice is harmless: the second call returns `false`.

/// Environment variable holding an `EnvFilter` directive for relaccel.
pub const ENV_LOG: &str = "RELACCEL_LOG";

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

#[cfg(feature = "logging")]
fn filter(default_level: &str) -> EnvFilter {
    std::env::var(ENV_LOG)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(format!("relaccel={default_level}")))
}

/// Install a formatter logging relaccel events at `info`.
#[cfg(feature = "logging")]
pub fn init() -> bool {
    init_with_level("info")
}

/// Install a formatter logging relaccel events at `level` (trace, debug,
/// info, warn, error) unless the environment overrides it.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) -> bool {
    fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .is_ok()
}

/// Debug-level logging routed through the test harness's captured output.
#[cfg(feature = "logging")]
pub fn init_test() -> bool {
    fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "logging"))]
pub fn init() -> bool {
    false
}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) -> bool {
    false
}

#[cfg(not(feature = "logging"))]
pub fn init_test() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "logging")]
    #[test]
    fn second_install_is_a_no_op() {
        init_test();
        assert!(!init_with_level("warn"));
    }

    #[cfg(not(feature = "logging"))]
    #[test]
    fn helpers_are_inert_without_the_feature() {
        assert!(!init());
        assert!(!init_test());
    }
}
