//! Crate-level error types for `luminal-kernel`.
//!
//! Provides a unified [`KernelError`] that composes errors from every
//! sub-module (photon, resolver, threads, config, IO) together with
//! [`error_stack::Report`] for context-carrying error propagation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use luminal_kernel::error::{KernelError, KernelResult};
//! use error_stack::ResultExt;
//!
//! fn read_manifest() -> KernelResult<String> {
//!     std::fs::read_to_string("photons.toml")
//!         .map_err(KernelError::from)
//!         .map_err(error_stack::Report::new)
//!         .attach("reading photons.toml")
//! }
//! ```

use crate::photon::{PhotonError, ResolveError};
use crate::threads::ThreadError;
use thiserror::Error;

/// Crate-level error type for `luminal-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A photon lifecycle error.
    #[error("Photon error: {0}")]
    Photon(#[from] PhotonError),

    /// Importing a photon source failed.
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// A worker or thread manager error.
    #[error("Thread error: {0}")]
    Thread(#[from] ThreadError),

    /// A configuration-related error (requires the `config` feature).
    #[cfg(feature = "config")]
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;
