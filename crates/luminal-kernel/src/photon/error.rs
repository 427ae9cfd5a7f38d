//! Typed errors for photons and photon resolvers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a photon or while driving its lifecycle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PhotonError {
    /// The photon does not provide a finalizer.
    #[error("Photon finalizer is not implemented")]
    FinalizerNotImplemented,

    /// A stop was requested on a handle that was never started.
    #[error("Photon '{0}' has not been initialized")]
    NotInitialized(String),

    /// The factory failed to build an instance.
    #[error("Failed to instantiate photon '{name}': {message}")]
    InstantiationFailed {
        /// Photon name.
        name: String,
        /// Factory error message.
        message: String,
    },

    /// The finalizer ran and failed.
    #[error("Photon finalizer failed: {0}")]
    Finalizer(String),

    /// An I/O error surfaced during a lifecycle operation.
    #[error("Photon I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for photon operations.
pub type PhotonResult<T> = Result<T, PhotonError>;

/// Errors raised while importing photon descriptors from a source file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The source, or something it imports, does not exist.
    #[error("Photon source not found: {0}")]
    NotFound(String),

    /// The source failed to parse.
    #[error("Syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    /// The source parsed but its top-level code failed.
    #[error("Execution error in {path}: {message}")]
    Execution { path: PathBuf, message: String },

    /// The source produced a declaration that cannot describe a photon.
    #[error("Invalid photon declaration in {path}: {message}")]
    InvalidDeclaration { path: PathBuf, message: String },

    /// Reading the source failed.
    #[error("Resolver I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    /// Import and syntax failures: the source could not be brought in at all.
    pub fn is_import_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Syntax { .. })
    }
}
