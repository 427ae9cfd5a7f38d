//! Photon hot-reload support
//!
//! - [`Loader`]: registry of loaded photons; load, unload and atomic reload
//! - [`Handle`]: one registered unit with its checksum and lifecycle
//! - [`PathResolver`]: module search path bookkeeping
//! - [`ModuleTable`]: loaded-module entries owned by handles
//! - change-watch loop driven by [`Loader::watch`], scriptable through
//!   [`LoopTrace`]

mod config;
mod handle;
mod loader;
mod log;
mod namespace;
mod resolver;
mod watcher;

pub use config::{DEFAULT_CHECKSUM_BLOCK_SIZE, ENV_PREFIX, LoaderConfig};
pub use handle::{Handle, HandleState};
pub use loader::{
    LoadOptions, LoadOutcome, Loader, LoaderError, LoaderEvent, LoaderResult, PhotonTarget,
    ReloadOutcome,
};
pub use log::LifecycleLog;
pub use namespace::{ModuleRecord, ModuleTable, is_submodule};
pub use resolver::{PathResolver, SearchPath, SearchPathGuard, normalize_path};
pub use watcher::{LoopTask, LoopTrace};
