//! Runtime configuration
//!
//! Library defaults with environment overrides, in the same spirit as
//! the logging configuration in `tasker_core::kprint`.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. `set_runtime_config()` before first use
//! 2. Environment variables
//! 3. Library defaults (`tasker_core::constants`)
//!
//! # Example
//!
//! ```rust,ignore
//! use tasker_runtime::config::{RuntimeConfig, set_runtime_config};
//!
//! let config = RuntimeConfig::from_env()
//!     .thread_prefix("worker")
//!     .stack_size(256 * 1024);
//! set_runtime_config(config)?;
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use tasker_core::constants::{DEFAULT_LOCK_BACKOFF_US, DEFAULT_LOCK_SPINS, DEFAULT_THREAD_PREFIX};
use tasker_core::env::{env_get, env_get_micros, env_get_str};
use tasker_core::{Priority, ThreadError, ThreadResult};

/// Smallest explicit stack size accepted (0 still means "platform default")
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Process-wide runtime configuration with builder pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for spawned threads, 0 = platform default
    pub stack_size: usize,
    /// Prefix for generated thread names
    pub thread_prefix: String,
    /// `timed_try_lock` polls that only yield before backing off
    pub lock_spins: u32,
    /// Sleep between `timed_try_lock` polls after the spin phase
    pub lock_backoff: Duration,
    /// Priority for threads that do not set one explicitly
    pub default_priority: Priority,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `TASKER_STACK_SIZE` - Stack size in bytes (0 = platform default)
    /// - `TASKER_THREAD_PREFIX` - Thread name prefix
    /// - `TASKER_LOCK_SPINS` - Yield-only polls in `timed_try_lock`
    /// - `TASKER_LOCK_BACKOFF_US` - Sleep between later polls, microseconds
    /// - `TASKER_DEFAULT_PRIORITY` - low, normal, high or realtime
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get("TASKER_STACK_SIZE", 0),
            thread_prefix: env_get_str("TASKER_THREAD_PREFIX", DEFAULT_THREAD_PREFIX),
            lock_spins: env_get("TASKER_LOCK_SPINS", DEFAULT_LOCK_SPINS),
            lock_backoff: env_get_micros("TASKER_LOCK_BACKOFF_US", DEFAULT_LOCK_BACKOFF_US),
            default_priority: env_get("TASKER_DEFAULT_PRIORITY", Priority::Normal),
        }
    }

    /// Library defaults only, ignoring the environment.
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            stack_size: 0,
            thread_prefix: DEFAULT_THREAD_PREFIX.to_string(),
            lock_spins: DEFAULT_LOCK_SPINS,
            lock_backoff: Duration::from_micros(DEFAULT_LOCK_BACKOFF_US),
            default_priority: Priority::Normal,
        }
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_prefix = prefix.into();
        self
    }

    pub fn lock_spins(mut self, spins: u32) -> Self {
        self.lock_spins = spins;
        self
    }

    pub fn lock_backoff(mut self, d: Duration) -> Self {
        self.lock_backoff = d;
        self
    }

    pub fn default_priority(mut self, p: Priority) -> Self {
        self.default_priority = p;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.stack_size != 0 && self.stack_size < MIN_STACK_SIZE {
            return Err("stack_size must be 0 or at least 16 KiB");
        }
        if self.thread_prefix.is_empty() {
            return Err("thread_prefix must not be empty");
        }
        if self.lock_backoff > Duration::from_millis(100) {
            return Err("lock_backoff must not exceed 100ms");
        }
        Ok(())
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// The process-wide configuration, read from the environment on first use
pub fn runtime_config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        match config.validate() {
            Ok(()) => config,
            Err(reason) => {
                tasker_core::kwarn!("ignoring environment configuration: {}", reason);
                RuntimeConfig::new()
            }
        }
    })
}

/// Install `config` as the process-wide configuration.
///
/// Fails with `BadValue` if it does not validate and with `InvalidState`
/// once the configuration has been read or set.
pub fn set_runtime_config(config: RuntimeConfig) -> ThreadResult<()> {
    config
        .validate()
        .map_err(|reason| ThreadError::bad_value("set_runtime_config", reason))?;
    CONFIG.set(config).map_err(|_| {
        let reason = "runtime configuration already initialized";
        ThreadError::invalid_state("set_runtime_config", reason)
    })
}
