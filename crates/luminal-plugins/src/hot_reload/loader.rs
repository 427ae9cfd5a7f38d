//! Photon loader: discovery, registration, unload and atomic reload.

use super::config::LoaderConfig;
use super::handle::Handle;
use super::log::LifecycleLog;
use super::namespace::{ModuleRecord, ModuleTable};
use super::resolver::{PathResolver, SearchPath, normalize_path};
use super::watcher::{self, LoopTrace};
use futures::FutureExt;
use futures::future::BoxFuture;
use luminal_kernel::photon::{
    PHOTON_CAPABILITY, PhotonDescriptor, PhotonError, PhotonResolver, ResolveError,
};
use luminal_kernel::threads::{ThreadError, ThreadManager};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

// ============================================================================
// Errors
// ============================================================================

/// Loader error types
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoaderError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Photon not found: {0}")]
    NotFound(String),

    #[error("Photon directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("The loader is already watching photons")]
    AlreadyWatching,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Photon(#[from] PhotonError),

    #[error(transparent)]
    Thread(#[from] ThreadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch unload failed after some files were already unloaded.
    #[error("Unloaded {} photon file(s) before failing: {source}", unloaded.len())]
    PartialUnload {
        unloaded: Vec<PathBuf>,
        #[source]
        source: Box<LoaderError>,
    },
}

impl LoaderError {
    /// The photon error at the root of this error, if any.
    pub fn photon_error(&self) -> Option<&PhotonError> {
        match self {
            Self::Photon(err) => Some(err),
            Self::PartialUnload { source, .. } => source.photon_error(),
            _ => None,
        }
    }
}

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;

// ============================================================================
// Options, targets and outcomes
// ============================================================================

/// Which units of a source get registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Units must expose this capability...
    pub capability: String,
    /// ...unless type names are listed, in which case only they match.
    pub extra_type_names: Vec<String>,
    /// Descend into every sub-directory when loading a directory.
    pub recursive: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            capability: PHOTON_CAPABILITY.to_string(),
            extra_type_names: Vec::new(),
            recursive: false,
        }
    }
}

impl LoadOptions {
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    pub fn with_type_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_type_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn validate(&self) -> LoaderResult<()> {
        if self.capability.trim().is_empty() {
            return Err(LoaderError::InvalidArgument(
                "capability must not be empty".to_string(),
            ));
        }
        if self.extra_type_names.iter().any(|name| name.trim().is_empty()) {
            return Err(LoaderError::InvalidArgument(
                "type names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn accepts(&self, descriptor: &PhotonDescriptor) -> bool {
        if self.extra_type_names.is_empty() {
            descriptor.satisfies(&self.capability)
        } else {
            self.extra_type_names
                .iter()
                .any(|name| name == descriptor.type_name())
        }
    }
}

/// Result of loading a single source.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Nothing was registered.
    None,
    One(Arc<Handle>),
    Many(Vec<Arc<Handle>>),
}

impl LoadOutcome {
    fn from_handles(mut handles: Vec<Arc<Handle>>) -> Self {
        match handles.len() {
            0 => Self::None,
            1 => handles.pop().map_or(Self::None, Self::One),
            _ => Self::Many(handles),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::One(_) => 1,
            Self::Many(handles) => handles.len(),
        }
    }

    pub fn into_vec(self) -> Vec<Arc<Handle>> {
        match self {
            Self::None => Vec::new(),
            Self::One(handle) => vec![handle],
            Self::Many(handles) => handles,
        }
    }
}

/// Result of an atomic reload.
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    /// The source was re-imported; these are the new handles.
    Reloaded(Vec<Arc<Handle>>),
    /// Re-import failed; the previous handles were put back.
    Reverted(Vec<Arc<Handle>>),
}

impl ReloadOutcome {
    pub fn handles(&self) -> &[Arc<Handle>] {
        match self {
            Self::Reloaded(handles) | Self::Reverted(handles) => handles,
        }
    }

    pub fn into_handles(self) -> Vec<Arc<Handle>> {
        match self {
            Self::Reloaded(handles) | Self::Reverted(handles) => handles,
        }
    }

    pub fn is_reverted(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }
}

/// Something that identifies registered handles.
#[derive(Debug, Clone)]
pub enum PhotonTarget {
    Handle(Arc<Handle>),
    /// Registered unit name.
    Name(String),
    /// Source file; every unit loaded from it.
    Path(PathBuf),
}

impl PhotonTarget {
    fn validate(&self) -> LoaderResult<()> {
        match self {
            Self::Name(name) if name.trim().is_empty() => Err(LoaderError::InvalidArgument(
                "photon name must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl From<Arc<Handle>> for PhotonTarget {
    fn from(handle: Arc<Handle>) -> Self {
        Self::Handle(handle)
    }
}

impl From<&Arc<Handle>> for PhotonTarget {
    fn from(handle: &Arc<Handle>) -> Self {
        Self::Handle(Arc::clone(handle))
    }
}

impl From<&str> for PhotonTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for PhotonTarget {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<PathBuf> for PhotonTarget {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for PhotonTarget {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoaderEvent {
    Loaded { name: String, path: PathBuf },
    Unloaded { name: String, path: PathBuf },
    Reloaded { name: String, path: PathBuf },
    Reverted { name: String, path: PathBuf, reason: String },
    /// The watch loop found a new source.
    Discovered { path: PathBuf },
    WatchStarted { directory: PathBuf },
    WatchStopped,
}

// ============================================================================
// Loader
// ============================================================================

/// Pre-reload state of one handle, kept for a revert.
struct Snapshot {
    handle: Arc<Handle>,
    descriptor: Option<PhotonDescriptor>,
    started: bool,
}

struct LoaderInner {
    config: LoaderConfig,
    log: LifecycleLog,
    resolver: Arc<dyn PhotonResolver>,
    paths: PathResolver,
    photons: RwLock<HashMap<String, Arc<Handle>>>,
    modules: Arc<ModuleTable>,
    threads: Arc<ThreadManager>,
    watching: AtomicBool,
    events: broadcast::Sender<LoaderEvent>,
}

/// Registry of loaded photons.
///
/// Cloning is cheap and yields another view of the same registry.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

impl Loader {
    pub fn new(resolver: impl PhotonResolver + 'static) -> Self {
        Self::with_config(resolver, LoaderConfig::default())
    }

    pub fn with_config(resolver: impl PhotonResolver + 'static, config: LoaderConfig) -> Self {
        Self::from_parts(Arc::new(resolver), config, SearchPath::new())
    }

    /// Build a loader sharing `search_path` with other components.
    pub fn from_parts(
        resolver: Arc<dyn PhotonResolver>,
        config: LoaderConfig,
        search_path: SearchPath,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let threads = ThreadManager::new("luminal-loader")
            .with_thread_limit(config.thread_limit)
            .with_poll_interval(config.poll_interval());

        Self {
            inner: Arc::new(LoaderInner {
                log: LifecycleLog::new(config.logging, config.suppress_errors),
                config,
                resolver,
                paths: PathResolver::new(search_path),
                photons: RwLock::new(HashMap::new()),
                modules: Arc::new(ModuleTable::new()),
                threads: Arc::new(threads),
                watching: AtomicBool::new(false),
                events,
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn modules(&self) -> &Arc<ModuleTable> {
        &self.inner.modules
    }

    pub fn search_path(&self) -> &SearchPath {
        self.inner.paths.search_path()
    }

    pub fn threads(&self) -> &Arc<ThreadManager> {
        &self.inner.threads
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watching.load(Ordering::SeqCst)
    }

    pub(crate) fn set_watching(&self, watching: bool) {
        self.inner.watching.store(watching, Ordering::SeqCst);
    }

    pub(crate) fn log(&self) -> LifecycleLog {
        self.inner.log
    }

    pub(crate) fn resolver(&self) -> &Arc<dyn PhotonResolver> {
        &self.inner.resolver
    }

    /// Options the watch loop uses for newly discovered sources.
    pub fn default_options(&self) -> LoadOptions {
        LoadOptions::default().with_capability(self.inner.config.capability.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: LoaderEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Registered handles sorted by name.
    pub async fn photons(&self) -> Vec<Arc<Handle>> {
        let mut handles: Vec<Arc<Handle>> =
            self.inner.photons.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    pub async fn names(&self) -> Vec<String> {
        self.photons()
            .await
            .iter()
            .map(|handle| handle.name().to_string())
            .collect()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Handle>> {
        self.inner.photons.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.photons.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.photons.read().await.is_empty()
    }

    /// Distinct source files of registered handles.
    pub async fn loaded_paths(&self) -> HashSet<PathBuf> {
        self.inner
            .photons
            .read()
            .await
            .values()
            .map(|handle| handle.filepath().to_path_buf())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Load every matching unit of the source at `path`.
    ///
    /// Import and syntax failures are logged and yield
    /// [`LoadOutcome::None`]; failures of the source's own code propagate.
    pub async fn load_one(
        &self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> LoaderResult<LoadOutcome> {
        options.validate()?;
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(LoaderError::NotFound("empty photon path".to_string()));
        }

        let filepath = normalize_path(path)?;
        match tokio::fs::metadata(&filepath).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(LoaderError::NotFound(format!(
                    "{} is a directory and not a photon file",
                    filepath.display()
                )));
            }
            Err(_) => return Err(LoaderError::NotFound(filepath.display().to_string())),
        }

        let parent = filepath.parent().unwrap_or(Path::new("/")).to_path_buf();
        let _search = self.inner.paths.enter(&parent)?;

        match self.import(&filepath, options).await {
            Ok(handles) => Ok(LoadOutcome::from_handles(handles)),
            Err(LoaderError::Resolve(err)) if err.is_import_failure() => {
                self.inner.log.error(format_args!(
                    "Can't import photon '{}' ({err}), skipping it",
                    filepath.display()
                ));
                Ok(LoadOutcome::None)
            }
            Err(err) => Err(err),
        }
    }

    /// Load every eligible source in `directory`, in name order.
    ///
    /// Sub-directories are descended when `options.recursive` is set or the
    /// directory holds no eligible files of its own.
    pub async fn load_many(
        &self,
        directory: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> LoaderResult<Vec<Arc<Handle>>> {
        options.validate()?;
        let directory = directory.as_ref();
        if directory.as_os_str().is_empty() {
            return Err(LoaderError::DirectoryNotFound(PathBuf::new()));
        }

        let directory = normalize_path(directory)?;
        match tokio::fs::metadata(&directory).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(LoaderError::DirectoryNotFound(directory)),
        }

        self.load_directory(directory, options).await
    }

    fn load_directory<'a>(
        &'a self,
        directory: PathBuf,
        options: &'a LoadOptions,
    ) -> BoxFuture<'a, LoaderResult<Vec<Arc<Handle>>>> {
        async move {
            let _search = self.inner.paths.enter(&directory)?;
            let (files, directories) = self.scan_directory(&directory).await?;

            let mut handles = Vec::new();
            for file in &files {
                handles.extend(self.load_one(file, options).await?.into_vec());
            }

            if options.recursive || files.is_empty() {
                for sub in directories {
                    handles.extend(self.load_directory(sub, options).await?);
                }
            }

            Ok(handles)
        }
        .boxed()
    }

    /// Sorted eligible files and visible sub-directories of `directory`.
    pub(crate) async fn scan_directory(
        &self,
        directory: &Path,
    ) -> LoaderResult<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut files = Vec::new();
        let mut directories = Vec::new();

        let mut entries = tokio::fs::read_dir(directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if !hidden {
                    directories.push(path);
                }
            } else if !hidden && self.inner.resolver.accepts(&path) {
                files.push(path);
            }
        }

        files.sort();
        directories.sort();
        Ok((files, directories))
    }

    /// Import `filepath` and register its matching units.
    async fn import(
        &self,
        filepath: &Path,
        options: &LoadOptions,
    ) -> LoaderResult<Vec<Arc<Handle>>> {
        let log = self.inner.log;
        let (module_name, namespace) = PathResolver::resolve(filepath);
        let registered = self
            .inner
            .photons
            .read()
            .await
            .values()
            .any(|handle| handle.filepath() == filepath);
        if registered || self.inner.modules.contains(&module_name) {
            log.warning(format_args!(
                "Photon '{}' is already loaded!",
                filepath.display()
            ));
            return Ok(Vec::new());
        }

        let search_path = self.inner.paths.search_path().snapshot();
        let descriptors = self.inner.resolver.resolve(filepath, &search_path).await?;
        tokio::task::yield_now().await;

        let checksum =
            Handle::compute_checksum(filepath, self.inner.config.checksum_block_size).await?;

        let mut registry = self.inner.photons.write().await;
        let mut handles = Vec::new();
        for descriptor in descriptors.into_iter().filter(|d| options.accepts(d)) {
            let name = descriptor.name().to_string();
            if let Some(existing) = registry.get(&name) {
                log.warning(format_args!(
                    "Photon name '{name}' is already registered from '{}', skipping",
                    existing.filepath().display()
                ));
                continue;
            }

            let handle = Arc::new(Handle::new(
                descriptor,
                filepath.to_path_buf(),
                module_name.clone(),
                namespace.clone(),
                checksum.clone(),
                options.clone(),
                Arc::clone(&self.inner.modules),
                log,
            ));
            registry.insert(name.clone(), Arc::clone(&handle));
            handles.push(handle);
        }
        drop(registry);

        if handles.is_empty() {
            log.warning(format_args!(
                "The photon located at '{}' was not loaded!",
                filepath.display()
            ));
            return Ok(handles);
        }

        let units = handles.iter().map(|h| h.name().to_string()).collect();
        self.inner
            .modules
            .insert_module(ModuleRecord::new(module_name, filepath, namespace).with_units(units));

        for handle in &handles {
            self.emit(LoaderEvent::Loaded {
                name: handle.name().to_string(),
                path: filepath.to_path_buf(),
            });
        }
        log.success(format_args!(
            "Successfully loaded photon '{}'!",
            filepath.display()
        ));
        Ok(handles)
    }

    // ------------------------------------------------------------------------
    // Unloading
    // ------------------------------------------------------------------------

    /// Registered handles sharing the source of `target`, sorted by name.
    async fn expand(&self, target: &PhotonTarget) -> LoaderResult<Vec<Arc<Handle>>> {
        let registry = self.inner.photons.read().await;
        let filepath = match target {
            PhotonTarget::Handle(handle) => handle.filepath().to_path_buf(),
            PhotonTarget::Name(name) => match registry.get(name) {
                Some(handle) => handle.filepath().to_path_buf(),
                None => return Ok(Vec::new()),
            },
            PhotonTarget::Path(path) => {
                let filepath = normalize_path(path)?;
                if !tokio::fs::metadata(&filepath).await.is_ok_and(|m| m.is_file()) {
                    return Err(LoaderError::NotFound(filepath.display().to_string()));
                }
                filepath
            }
        };

        let mut handles: Vec<Arc<Handle>> = registry
            .values()
            .filter(|handle| handle.filepath() == filepath)
            .cloned()
            .collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(handles)
    }

    async fn deregister(&self, handle: &Arc<Handle>) {
        let mut registry = self.inner.photons.write().await;
        if registry
            .get(handle.name())
            .is_some_and(|registered| Arc::ptr_eq(registered, handle))
        {
            registry.remove(handle.name());
        }
    }

    /// Stop and deregister every unit loaded from the source of `target`.
    ///
    /// Returns `false` when nothing is registered for it. A failing
    /// finalizer propagates and leaves that unit registered.
    pub async fn unload_one(
        &self,
        target: impl Into<PhotonTarget>,
        force: bool,
    ) -> LoaderResult<bool> {
        let target = target.into();
        target.validate()?;

        let handles = self.expand(&target).await?;
        if handles.is_empty() {
            self.inner.log.warning(format_args!("No registered photon matches {target:?}"));
            return Ok(false);
        }

        for handle in handles {
            handle.stop(force).await?;
            self.deregister(&handle).await;
            self.emit(LoaderEvent::Unloaded {
                name: handle.name().to_string(),
                path: handle.filepath().to_path_buf(),
            });
            self.inner.log.info(format_args!("Photon '{}' unloaded", handle.name()));
        }
        Ok(true)
    }

    /// Unload several targets in order; returns the distinct source files
    /// that were unloaded.
    pub async fn unload_many<I, T>(&self, targets: I, force: bool) -> LoaderResult<Vec<PathBuf>>
    where
        I: IntoIterator<Item = T>,
        T: Into<PhotonTarget>,
    {
        let targets: Vec<PhotonTarget> = targets.into_iter().map(Into::into).collect();
        for target in &targets {
            target.validate()?;
        }

        let mut unloaded: Vec<PathBuf> = Vec::new();
        for target in targets {
            let filepath = match &target {
                PhotonTarget::Handle(handle) => Some(handle.filepath().to_path_buf()),
                PhotonTarget::Name(name) => {
                    self.get(name).await.map(|h| h.filepath().to_path_buf())
                }
                PhotonTarget::Path(path) => Some(normalize_path(path)?),
            };

            match self.unload_one(target, force).await {
                Ok(true) => {
                    if let Some(filepath) = filepath {
                        if !unloaded.contains(&filepath) {
                            unloaded.push(filepath);
                        }
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    return Err(LoaderError::PartialUnload {
                        unloaded,
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(unloaded)
    }

    // ------------------------------------------------------------------------
    // Reloading
    // ------------------------------------------------------------------------

    /// Atomically replace the units loaded from the source of `target`.
    ///
    /// Started units are stopped first, forcibly if their finalizer fails.
    /// When the source no longer imports, or no unit matches any more, the
    /// previous handles are re-registered and restarted if they were running.
    pub async fn reload_one(&self, target: impl Into<PhotonTarget>) -> LoaderResult<ReloadOutcome> {
        let target = target.into();
        target.validate()?;

        let handles = self.expand(&target).await?;
        let Some(first) = handles.first() else {
            return Err(LoaderError::NotFound(format!("{target:?}")));
        };
        let filepath = first.filepath().to_path_buf();
        let options = first.options().clone();
        let module_name = first.module_name().to_string();

        let mut modules = self.inner.modules.snapshot_owned(&module_name);
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in &handles {
            modules.extend(self.inner.modules.snapshot_owned(handle.name()));
            snapshots.push(Snapshot {
                handle: Arc::clone(handle),
                descriptor: handle.snapshot().await,
                started: handle.is_started().await,
            });
        }

        for handle in &handles {
            if handle.is_started().await {
                if let Err(err) = handle.stop(false).await {
                    debug!(photon = %handle.name(), "Graceful stop before reload failed: {err}");
                    // The old instance must not outlive the reload.
                    if let Err(err) = handle.stop(true).await {
                        debug!(photon = %handle.name(), "Forced stop before reload failed: {err}");
                    }
                }
            }
            handle.clear_module_references();
            self.deregister(handle).await;
        }
        self.inner.modules.remove_owned(&module_name);

        let parent = filepath.parent().unwrap_or(Path::new("/")).to_path_buf();
        let result = match self.inner.paths.enter(&parent) {
            Ok(_search) => self.import(&filepath, &options).await,
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(new_handles) if !new_handles.is_empty() => {
                for handle in &new_handles {
                    self.emit(LoaderEvent::Reloaded {
                        name: handle.name().to_string(),
                        path: filepath.clone(),
                    });
                }
                info!(path = ?filepath, count = new_handles.len(), "Photon reloaded");
                Ok(ReloadOutcome::Reloaded(new_handles))
            }
            Ok(_) => {
                let reason = "no matching photon in reloaded source".to_string();
                Ok(ReloadOutcome::Reverted(self.revert(snapshots, modules, reason).await))
            }
            Err(err) => {
                let reason = err.to_string();
                Ok(ReloadOutcome::Reverted(self.revert(snapshots, modules, reason).await))
            }
        }
    }

    async fn revert(
        &self,
        snapshots: Vec<Snapshot>,
        modules: Vec<ModuleRecord>,
        reason: String,
    ) -> Vec<Arc<Handle>> {
        let log = self.inner.log;
        log.note(format_args!(
            "Requested photon couldn't be reloaded ({reason}), reverting state!"
        ));

        // Whatever a failed import managed to register goes first.
        self.inner.modules.restore(modules);

        let mut restored = Vec::new();
        for Snapshot {
            handle,
            descriptor,
            started,
        } in snapshots
        {
            let Some(descriptor) = descriptor else {
                log.warning(format_args!(
                    "Photon '{}' was perturbed and may not function correctly, if at all.",
                    handle.name()
                ));
                continue;
            };

            handle.restore(descriptor).await;
            if started {
                handle.start().await;
            }
            self.inner
                .photons
                .write()
                .await
                .insert(handle.name().to_string(), Arc::clone(&handle));
            self.emit(LoaderEvent::Reverted {
                name: handle.name().to_string(),
                path: handle.filepath().to_path_buf(),
                reason: reason.clone(),
            });
            log.success(format_args!(
                "Photon '{}' successfully reverted to its original state!",
                handle.name()
            ));
            restored.push(handle);
        }
        restored
    }

    /// Reload several targets independently; failures are logged.
    pub async fn reload_many<I, T>(&self, targets: I) -> LoaderResult<Vec<Arc<Handle>>>
    where
        I: IntoIterator<Item = T>,
        T: Into<PhotonTarget>,
    {
        let targets: Vec<PhotonTarget> = targets.into_iter().map(Into::into).collect();
        for target in &targets {
            target.validate()?;
        }

        let mut handles = Vec::new();
        for target in targets {
            match self.reload_one(target.clone()).await {
                Ok(outcome) => handles.extend(outcome.into_handles()),
                Err(err) => self
                    .inner
                    .log
                    .error(format_args!("Failed to reload {target:?}: {err}")),
            }
        }
        Ok(handles)
    }

    /// Start every registered unit that has not been started yet.
    pub async fn start_all(&self) {
        for handle in self.photons().await {
            if !handle.is_started().await {
                handle.start().await;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Watching
    // ------------------------------------------------------------------------

    /// Watch `directory` on a background worker, loading new sources and
    /// reloading changed ones.
    pub async fn watch(&self, directory: impl AsRef<Path>) -> LoaderResult<()> {
        self.watch_with_trace(directory, None).await
    }

    /// [`watch`](Self::watch) with an optional scripted [`LoopTrace`].
    pub async fn watch_with_trace(
        &self,
        directory: impl AsRef<Path>,
        trace: Option<LoopTrace>,
    ) -> LoaderResult<()> {
        let directory = directory.as_ref();
        if directory.as_os_str().is_empty() {
            return Err(LoaderError::InvalidArgument(
                "photons directory must not be empty".to_string(),
            ));
        }
        let directory = normalize_path(directory)?;
        if !tokio::fs::metadata(&directory).await.is_ok_and(|m| m.is_dir()) {
            return Err(LoaderError::DirectoryNotFound(directory));
        }

        if self.inner.watching.swap(true, Ordering::SeqCst) {
            return Err(LoaderError::AlreadyWatching);
        }

        let threads = &self.inner.threads;
        threads.set_thread_limit(1);
        threads.prune();
        if threads.running_count() > 0 {
            // The previous watch worker has not exited yet.
            self.set_watching(false);
            return Err(LoaderError::Thread(ThreadError::AlreadyRunning));
        }

        let loader = self.clone();
        threads.append(
            |ctx, (loader, directory, trace): (Loader, PathBuf, Option<LoopTrace>)| {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(watcher::observe(loader, directory, trace, ctx))
            },
            (loader, directory.clone(), trace),
        );

        if let Err(err) = threads.run() {
            self.set_watching(false);
            return Err(err.into());
        }

        self.emit(LoaderEvent::WatchStarted {
            directory: directory.clone(),
        });
        self.inner
            .log
            .info(format_args!("Watching photons in '{}'", directory.display()));
        tokio::task::yield_now().await;
        Ok(())
    }

    /// Stop the watch loop.
    ///
    /// With `halt_immediately` the worker is halted and joined before this
    /// returns; otherwise it exits at its next poll boundary. Must not be
    /// awaited with `halt_immediately` from inside the watch loop itself.
    pub async fn stop_watching(&self, halt_immediately: bool) {
        self.set_watching(false);
        if halt_immediately {
            let threads = Arc::clone(&self.inner.threads);
            if let Err(err) = tokio::task::spawn_blocking(move || threads.halt()).await {
                self.inner
                    .log
                    .error(format_args!("Watch worker could not be halted: {err}"));
            }
        }
        self.inner.threads.stop();
        self.emit(LoaderEvent::WatchStopped);
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.inner.config)
            .field("watching", &self.is_watching())
            .finish_non_exhaustive()
    }
}
