use super::{Instance, PHOTON_CAPABILITY, Photon, PhotonContext, PhotonMetadata, PhotonResult};
use std::any::Any;
use std::sync::Arc;

/// Builds an instance for a handle.
pub type PhotonFactory = Arc<dyn Fn(&PhotonContext) -> PhotonResult<Instance> + Send + Sync>;

/// An uninstantiated unit produced by a resolver.
///
/// Cloning is cheap; the factory is shared.
#[derive(Clone)]
pub struct PhotonDescriptor {
    type_name: String,
    metadata: Option<PhotonMetadata>,
    capabilities: Vec<String>,
    factory: PhotonFactory,
}

impl PhotonDescriptor {
    /// A descriptor with an arbitrary factory and no capabilities.
    pub fn new<F>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PhotonContext) -> PhotonResult<Instance> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            metadata: None,
            capabilities: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    /// A photon unit built from a Rust type implementing [`Photon`].
    pub fn photon<P, F>(metadata: PhotonMetadata, factory: F) -> Self
    where
        P: Photon,
        F: Fn(&PhotonContext) -> PhotonResult<P> + Send + Sync + 'static,
    {
        Self::new(short_type_name::<P>(), move |ctx| {
            factory(ctx).map(|photon| Instance::Photon(Box::new(photon)))
        })
        .with_metadata(metadata)
    }

    /// A plain unit without the photon capability.
    pub fn plain<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&PhotonContext) -> PhotonResult<T> + Send + Sync + 'static,
    {
        Self::new(short_type_name::<T>(), move |ctx| {
            factory(ctx).map(|value| Instance::Plain(Box::new(value)))
        })
    }

    /// Attach photon metadata; this also grants the photon capability.
    pub fn with_metadata(mut self, metadata: PhotonMetadata) -> Self {
        self.metadata = Some(metadata);
        self.with_capability(PHOTON_CAPABILITY)
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn metadata(&self) -> Option<&PhotonMetadata> {
        self.metadata.as_ref()
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Declared photon name, falling back to the type name.
    pub fn name(&self) -> &str {
        self.metadata
            .as_ref()
            .map_or(self.type_name.as_str(), |meta| meta.name.as_str())
    }

    pub fn is_photon(&self) -> bool {
        self.satisfies(PHOTON_CAPABILITY)
    }

    pub fn satisfies(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn instantiate(&self, ctx: &PhotonContext) -> PhotonResult<Instance> {
        (self.factory)(ctx)
    }
}

impl std::fmt::Debug for PhotonDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotonDescriptor")
            .field("type_name", &self.type_name)
            .field("metadata", &self.metadata)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// `my_crate::module::Thing<T>` -> `Thing`
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
