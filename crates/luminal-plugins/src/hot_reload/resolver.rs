//! Module search path bookkeeping.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Directories consulted when a photon imports another source.
#[derive(Debug, Clone, Default)]
pub struct SearchPath(Arc<RwLock<Vec<PathBuf>>>);

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.0.read().clone()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.read().iter().any(|entry| entry == path)
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

/// Absolute, lexically normalized form of `path`.
///
/// `.` components are dropped and `..` pops the previous component. The
/// filesystem is not consulted, so symlinks are preserved.
pub fn normalize_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Adds directories to the shared [`SearchPath`] and removes exactly the
/// entries it added.
#[derive(Debug, Default)]
pub struct PathResolver {
    search_path: SearchPath,
    modified: Mutex<HashMap<PathBuf, usize>>,
}

impl PathResolver {
    pub fn new(search_path: SearchPath) -> Self {
        Self {
            search_path,
            modified: Mutex::new(HashMap::new()),
        }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    /// Normalize `path` and append it to the search path if absent.
    pub fn normalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.insert(path).map(|(normalized, _)| normalized)
    }

    fn insert(&self, path: &Path) -> io::Result<(PathBuf, bool)> {
        let normalized = normalize_path(path)?;
        let mut entries = self.search_path.0.write();
        if entries.contains(&normalized) {
            return Ok((normalized, false));
        }

        entries.push(normalized.clone());
        self.modified
            .lock()
            .insert(normalized.clone(), entries.len() - 1);
        debug!(path = ?normalized, "Search path extended");
        Ok((normalized, true))
    }

    /// Remove `path` from the search path.
    ///
    /// The recorded insertion index is used when it still points at `path`;
    /// otherwise the last matching entry is removed.
    pub fn reset(&self, path: &Path) -> bool {
        let Ok(normalized) = normalize_path(path) else {
            return false;
        };
        let mut entries = self.search_path.0.write();
        let recorded = self.modified.lock().remove(&normalized);

        let index = match recorded {
            Some(index) if entries.get(index) == Some(&normalized) => Some(index),
            _ => entries.iter().rposition(|entry| entry == &normalized),
        };

        match index {
            Some(index) => {
                entries.remove(index);
                debug!(path = ?normalized, "Search path entry removed");
                true
            }
            None => false,
        }
    }

    /// Add `path` for the lifetime of the returned guard.
    ///
    /// Entries that were already present are left in place on drop.
    pub fn enter(&self, path: &Path) -> io::Result<SearchPathGuard<'_>> {
        let (path, inserted) = self.insert(path)?;
        Ok(SearchPathGuard {
            resolver: self,
            path,
            inserted,
        })
    }

    /// Canonical module name (file stem) and dotted namespace of `path`.
    ///
    /// `/srv/photons/clock.rhai` resolves to `("clock", "srv.photons")`.
    pub fn resolve(path: &Path) -> (String, String) {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let namespace = path
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|component| match component {
                        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .unwrap_or_default();

        (name, namespace)
    }
}

/// Removes its directory from the search path when dropped.
#[derive(Debug)]
pub struct SearchPathGuard<'a> {
    resolver: &'a PathResolver,
    path: PathBuf,
    inserted: bool,
}

impl SearchPathGuard<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SearchPathGuard<'_> {
    fn drop(&mut self) {
        if self.inserted {
            self.resolver.reset(&self.path);
        }
    }
}
