//! Loader configuration.

use error_stack::{Report, ResultExt};
use luminal_kernel::PHOTON_CAPABILITY;
use luminal_kernel::config::{load_config, load_with_env};
use luminal_kernel::error::{KernelError, KernelResult};
use luminal_kernel::threads::DEFAULT_THREAD_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides, e.g. `LUMINAL__POLL_INTERVAL_MS=250`.
pub const ENV_PREFIX: &str = "LUMINAL";

/// Default checksum block size (1 MiB).
pub const DEFAULT_CHECKSUM_BLOCK_SIZE: usize = 1 << 20;

/// Loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Emit lifecycle messages
    pub logging: bool,
    /// Silence error-level lifecycle messages
    pub suppress_errors: bool,
    /// Concurrency limit of the loader's thread manager
    pub thread_limit: usize,
    /// Pause between passes of the watch loop (milliseconds)
    pub poll_interval_ms: u64,
    /// Read size used when computing checksums
    pub checksum_block_size: usize,
    /// Capability new files must expose to be registered by the watch loop
    pub capability: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            logging: false,
            suppress_errors: false,
            thread_limit: DEFAULT_THREAD_LIMIT,
            poll_interval_ms: 1000,
            checksum_block_size: DEFAULT_CHECKSUM_BLOCK_SIZE,
            capability: PHOTON_CAPABILITY.to_string(),
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_suppress_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    pub fn with_thread_limit(mut self, limit: usize) -> Self {
        self.thread_limit = limit;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_checksum_block_size(mut self, size: usize) -> Self {
        self.checksum_block_size = size;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load from a YAML, TOML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        load_config(path)
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach(format!("loading loader config from {}", path.display()))
    }

    /// Load from an optional file, then apply `LUMINAL__*` overrides.
    pub fn from_env(path: Option<&Path>) -> KernelResult<Self> {
        load_with_env(path, ENV_PREFIX)
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach("loading loader config from the environment")
    }
}
