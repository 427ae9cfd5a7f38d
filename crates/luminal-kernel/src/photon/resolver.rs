use super::{PhotonDescriptor, ResolveError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Imports photon descriptors from a source file.
///
/// `search_path` is the loader's module search path at call time; resolvers
/// that support imports between sources consult it after the file's own
/// directory.
#[async_trait]
pub trait PhotonResolver: Send + Sync {
    /// File extensions (without the dot) this resolver understands.
    fn extensions(&self) -> Vec<String>;

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    /// Import `path` and return every unit it declares, in declaration order.
    async fn resolve(
        &self,
        path: &Path,
        search_path: &[PathBuf],
    ) -> Result<Vec<PhotonDescriptor>, ResolveError>;
}
