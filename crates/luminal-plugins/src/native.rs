//! Native photons
//!
//! Photons implemented in Rust are registered with a [`NativeResolver`] up
//! front. A `.photon` manifest on disk selects which registered types a
//! file provides, so native photons go through the same load, reload and
//! watch cycle as scripted ones:
//!
//! ```toml
//! types = ["Alpha", "Sigma"]
//! ```

use async_trait::async_trait;
use luminal_kernel::photon::{PhotonDescriptor, PhotonResolver, ResolveError};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    types: Vec<String>,
}

/// Resolves `.photon` manifests against a registry of Rust photon types.
#[derive(Debug, Clone, Default)]
pub struct NativeResolver {
    registry: HashMap<String, PhotonDescriptor>,
}

impl NativeResolver {
    pub const EXTENSION: &'static str = "photon";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type; a later registration under the same type name wins.
    pub fn register(&mut self, descriptor: PhotonDescriptor) -> &mut Self {
        self.registry
            .insert(descriptor.type_name().to_string(), descriptor);
        self
    }

    pub fn with(mut self, descriptor: PhotonDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.registry.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.registry.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl PhotonResolver for NativeResolver {
    fn extensions(&self) -> Vec<String> {
        vec![Self::EXTENSION.to_string()]
    }

    async fn resolve(
        &self,
        path: &Path,
        _search_path: &[PathBuf],
    ) -> Result<Vec<PhotonDescriptor>, ResolveError> {
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ResolveError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = toml::from_str(&source).map_err(|e| ResolveError::Syntax {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let descriptors = manifest
            .types
            .iter()
            .map(|name| {
                self.registry.get(name).cloned().ok_or_else(|| {
                    ResolveError::NotFound(format!(
                        "native photon type '{name}' referenced by {}",
                        path.display()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            path = %path.display(),
            units = descriptors.len(),
            "Resolved native photon manifest"
        );
        Ok(descriptors)
    }
}

/// Dispatches each file to the first resolver that accepts its extension.
#[derive(Clone, Default)]
pub struct ResolverSet {
    resolvers: Vec<Arc<dyn PhotonResolver>>,
}

impl ResolverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl PhotonResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl std::fmt::Debug for ResolverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverSet")
            .field("extensions", &self.extensions())
            .finish()
    }
}

#[async_trait]
impl PhotonResolver for ResolverSet {
    fn extensions(&self) -> Vec<String> {
        let mut extensions = Vec::new();
        for ext in self.resolvers.iter().flat_map(|r| r.extensions()) {
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        extensions
    }

    fn accepts(&self, path: &Path) -> bool {
        self.resolvers.iter().any(|r| r.accepts(path))
    }

    async fn resolve(
        &self,
        path: &Path,
        search_path: &[PathBuf],
    ) -> Result<Vec<PhotonDescriptor>, ResolveError> {
        match self.resolvers.iter().find(|r| r.accepts(path)) {
            Some(resolver) => resolver.resolve(path, search_path).await,
            None => Err(ResolveError::NotFound(format!(
                "no resolver accepts {}",
                path.display()
            ))),
        }
    }
}
