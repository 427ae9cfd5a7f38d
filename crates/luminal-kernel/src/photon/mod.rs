//! Photon contracts.
//!
//! A photon is an independently authored unit of code that Luminal loads,
//! starts, stops and hot-reloads at runtime. The loader only needs two
//! things from it: a name, and optionally an asynchronous finalizer run
//! before the instance is disposed.
//!
//! Source files are turned into [`PhotonDescriptor`]s by a
//! [`PhotonResolver`]. A descriptor is an uninstantiated unit; calling
//! [`PhotonDescriptor::instantiate`] yields an [`Instance`].

mod context;
mod descriptor;
mod error;
mod resolver;

pub use context::PhotonContext;
pub use descriptor::{PhotonDescriptor, PhotonFactory};
pub use error::{PhotonError, PhotonResult, ResolveError};
pub use resolver::PhotonResolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Capability carried by every unit that declares photon metadata.
pub const PHOTON_CAPABILITY: &str = "photon";

/// Default author when a photon does not declare one.
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Default version when a photon does not declare one.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Declared identity of a photon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotonMetadata {
    pub name: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_tags() -> Vec<String> {
    vec!["luminal".to_string(), "photon".to_string()]
}

impl PhotonMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: default_author(),
            version: default_version(),
            description: String::new(),
            tags: default_tags(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the tag list.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A live photon instance.
///
/// The default finalizer reports [`PhotonError::FinalizerNotImplemented`],
/// which the loader surfaces to the caller of a graceful stop.
#[async_trait]
pub trait Photon: Send + Sync + 'static {
    /// Release resources before the instance is dropped.
    async fn finalize(&mut self) -> PhotonResult<bool> {
        Err(PhotonError::FinalizerNotImplemented)
    }

    fn as_any(&self) -> &dyn Any;
}

/// What a descriptor's factory produced.
pub enum Instance {
    /// Exposes the photon capability, including its finalizer.
    Photon(Box<dyn Photon>),
    /// Any other value. Stopping it always takes the forced path.
    Plain(Box<dyn Any + Send + Sync>),
}

impl Instance {
    pub fn is_photon(&self) -> bool {
        matches!(self, Self::Photon(_))
    }

    pub fn as_photon_mut(&mut self) -> Option<&mut (dyn Photon + 'static)> {
        match self {
            Self::Photon(photon) => Some(photon.as_mut()),
            Self::Plain(_) => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Photon(photon) => photon.as_any().downcast_ref(),
            Self::Plain(value) => value.downcast_ref(),
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Photon(_) => f.write_str("Instance::Photon(..)"),
            Self::Plain(_) => f.write_str("Instance::Plain(..)"),
        }
    }
}
