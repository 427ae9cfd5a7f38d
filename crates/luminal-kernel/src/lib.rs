//! Luminal Kernel
//!
//! Core contracts shared by every Luminal crate:
//!
//! - [`photon`]: the photon capability, descriptors, instances and the
//!   resolver seam used to import them from disk
//! - [`threads`]: bounded workers with a cooperative kill switch
//! - [`config`]: multi-format configuration loading (`config` feature)
//! - [`logging`]: tracing subscriber setup

// photon module
pub mod photon;
pub use photon::*;

// threads module
pub mod threads;
pub use threads::{ThreadError, ThreadManager, Worker, WorkerContext, WorkerState};

// logging module
pub mod logging;

// error module
pub mod error;

// config module
#[cfg(feature = "config")]
pub mod config;
