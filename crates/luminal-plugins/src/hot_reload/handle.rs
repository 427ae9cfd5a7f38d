//! A loaded photon unit and its lifecycle.

use super::log::LifecycleLog;
use super::loader::LoadOptions;
use super::namespace::ModuleTable;
use chrono::{DateTime, Utc};
use luminal_kernel::photon::{Instance, PhotonContext, PhotonDescriptor, PhotonError, PhotonResult};
use sha2::{Digest, Sha512};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

/// Observable lifecycle state of a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Descriptor only, never started.
    Unresolved,
    /// Started with a live instance.
    Resolved,
    /// Started, but instantiation failed.
    Partial,
    /// Stopped and cleared.
    Disposed,
}

impl HandleState {
    pub fn is_started(self) -> bool {
        matches!(self, Self::Resolved | Self::Partial)
    }
}

enum InstanceRef {
    Unresolved(PhotonDescriptor),
    Resolved {
        descriptor: PhotonDescriptor,
        instance: Instance,
    },
    Partial,
    Disposed,
}

impl InstanceRef {
    fn state(&self) -> HandleState {
        match self {
            Self::Unresolved(_) => HandleState::Unresolved,
            Self::Resolved { .. } => HandleState::Resolved,
            Self::Partial => HandleState::Partial,
            Self::Disposed => HandleState::Disposed,
        }
    }
}

/// One registered photon unit.
///
/// Handles are shared as `Arc<Handle>`; the loader's registry owns them.
pub struct Handle {
    name: String,
    filepath: PathBuf,
    module_name: String,
    namespace: String,
    checksum: Option<String>,
    options: LoadOptions,
    loaded_at: DateTime<Utc>,
    instance: Mutex<InstanceRef>,
    context: PhotonContext,
    modules: Arc<ModuleTable>,
    log: LifecycleLog,
}

impl Handle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        descriptor: PhotonDescriptor,
        filepath: PathBuf,
        module_name: String,
        namespace: String,
        checksum: Option<String>,
        options: LoadOptions,
        modules: Arc<ModuleTable>,
        log: LifecycleLog,
    ) -> Self {
        let name = descriptor.name().to_string();
        Self {
            context: PhotonContext::new(name.clone(), filepath.clone()),
            name,
            filepath,
            module_name,
            namespace,
            checksum,
            options,
            loaded_at: Utc::now(),
            instance: Mutex::new(InstanceRef::Unresolved(descriptor)),
            modules,
            log,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Canonical name of the module this unit came from.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// SHA-512 of the source at load time.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn context(&self) -> &PhotonContext {
        &self.context
    }

    pub async fn state(&self) -> HandleState {
        self.instance.lock().await.state()
    }

    pub async fn is_started(&self) -> bool {
        self.state().await.is_started()
    }

    /// Run `f` against the live instance, if any.
    pub async fn with_instance<R>(&self, f: impl FnOnce(&Instance) -> R) -> Option<R> {
        match &*self.instance.lock().await {
            InstanceRef::Resolved { instance, .. } => Some(f(instance)),
            _ => None,
        }
    }

    /// Hex SHA-512 of `path`, read `block_size` bytes at a time.
    ///
    /// Returns `None` when `path` is not a regular file.
    pub async fn compute_checksum(path: &Path, block_size: usize) -> io::Result<Option<String>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        }

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha512::new();
        let mut buffer = vec![0u8; block_size.max(1)];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    /// Instantiate the unit if it has not been started.
    ///
    /// A failing factory leaves the handle in partial mode instead of
    /// returning an error.
    pub async fn start(&self) {
        tokio::task::yield_now().await;
        let mut slot = self.instance.lock().await;
        let current = std::mem::replace(&mut *slot, InstanceRef::Disposed);
        *slot = match current {
            InstanceRef::Unresolved(descriptor) => match descriptor.instantiate(&self.context) {
                Ok(instance) => {
                    self.log.debug(format_args!("Photon '{}' started", self.name));
                    InstanceRef::Resolved {
                        descriptor,
                        instance,
                    }
                }
                Err(err) => {
                    self.log.error(format_args!(
                        "Photon '{}' started in partial mode due to the following: {err}",
                        self.name
                    ));
                    InstanceRef::Partial
                }
            },
            other => other,
        };
    }

    /// Stop the unit and clear its module entries.
    ///
    /// A graceful stop awaits the photon's finalizer and propagates its
    /// error, leaving the handle untouched. Plain instances, partial
    /// handles and `force == true` take the forced path, which halts the
    /// unit's workers and terminates its child processes.
    pub async fn stop(&self, force: bool) -> PhotonResult<()> {
        let mut slot = self.instance.lock().await;
        match &mut *slot {
            InstanceRef::Unresolved(_) | InstanceRef::Disposed => {
                return Err(PhotonError::NotInitialized(self.name.clone()));
            }
            InstanceRef::Resolved { instance, .. } if !force => match instance.as_photon_mut() {
                Some(photon) => {
                    if !photon.finalize().await? {
                        self.log.warning(format_args!(
                            "Finalizer of photon '{}' reported an unclean shutdown",
                            self.name
                        ));
                    }
                }
                None => self.force_stop().await,
            },
            _ => self.force_stop().await,
        }

        self.clear_module_references();
        *slot = InstanceRef::Disposed;
        self.log.debug(format_args!("Photon '{}' stopped", self.name));
        Ok(())
    }

    async fn force_stop(&self) {
        let context = self.context.clone();
        let reclaimed = tokio::task::spawn_blocking(move || {
            let halted = context.halt_workers();
            let failures = context.terminate_processes();
            (halted, failures)
        })
        .await;

        match reclaimed {
            Ok((halted, failures)) => {
                self.log.debug(format_args!(
                    "Photon '{}' force-stopped ({halted} worker(s) halted)",
                    self.name
                ));
                if !failures.is_empty() {
                    self.log.error(format_args!(
                        "Photon '{}' child processes could not be terminated: {} failure(s)",
                        self.name,
                        failures.len()
                    ));
                }
            }
            Err(err) => self.log.error(format_args!(
                "Photon '{}' child threads could not be halted: {err}",
                self.name
            )),
        }
    }

    pub(crate) fn clear_module_references(&self) {
        self.modules.remove_owned(&self.module_name);
        self.modules.remove_owned(&self.name);
    }

    /// Descriptor to restore from, if the handle still has one.
    pub(crate) async fn snapshot(&self) -> Option<PhotonDescriptor> {
        match &*self.instance.lock().await {
            InstanceRef::Unresolved(descriptor) | InstanceRef::Resolved { descriptor, .. } => {
                Some(descriptor.clone())
            }
            InstanceRef::Partial | InstanceRef::Disposed => None,
        }
    }

    /// Reset to an unstarted handle built from `descriptor`.
    pub(crate) async fn restore(&self, descriptor: PhotonDescriptor) {
        *self.instance.lock().await = InstanceRef::Unresolved(descriptor);
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("filepath", &self.filepath)
            .field("module_name", &self.module_name)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}
