//! Configuration for Vigil.
//!
//! - TOML daemon configuration with serde defaults
//! - `VIGIL_*` environment overrides with type-safe parsing
//! - Source tracking for debugging
//! - Validation on startup

pub mod daemon;
pub mod env;
pub mod source;

pub use daemon::{
    ConfigError, DaemonConfig, GeneralConfig, LoadedConfig, PollerConfig, ProbeConfig,
    StoreConfig,
};
pub use env::{EnvError, EnvParser, expand_home};
pub use source::{ConfigSource, ConfigValueSource, Sourced};

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
