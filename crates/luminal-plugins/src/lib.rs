//! Luminal Plugins
//!
//! Loads photons from disk, drives their lifecycle and hot-reloads them:
//!
//! - [`hot_reload`]: the [`Loader`](hot_reload::Loader), its handles,
//!   module bookkeeping and the change-watch loop
//! - [`rhai_runtime`]: photons written as Rhai scripts
//! - [`native`]: photons implemented in Rust and selected by a manifest
//!
//! ```rust,ignore
//! use luminal_plugins::hot_reload::{LoadOptions, Loader, LoaderConfig};
//! use luminal_plugins::rhai_runtime::RhaiResolver;
//!
//! let config = LoaderConfig::default().with_logging(true);
//! let loader = Loader::with_config(RhaiResolver::default(), config);
//! let handles = loader.load_many("photons/", &LoadOptions::default()).await?;
//! for handle in &handles {
//!     handle.start().await;
//! }
//! loader.watch("photons/").await?;
//! ```

pub mod hot_reload;
pub mod native;
pub mod rhai_runtime;

pub use luminal_kernel::photon::{
    Instance, PHOTON_CAPABILITY, Photon, PhotonContext, PhotonDescriptor, PhotonError,
    PhotonMetadata, PhotonResolver, PhotonResult, ResolveError,
};
