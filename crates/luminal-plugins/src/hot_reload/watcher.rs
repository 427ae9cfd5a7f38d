//! Change-watch loop.
//!
//! Each pass:
//!
//! 1. collects the sources of registered photons
//! 2. loads eligible files in the watched directory that are not loaded
//! 3. recomputes checksums and reloads the sources that changed
//! 4. starts every unit that is not started yet
//! 5. evaluates the optional [`LoopTrace`], then sleeps
//!
//! The loop ends when the loader stops watching, when its worker is
//! halted, or when the trace reaches its iteration limit.

use super::handle::Handle;
use super::loader::{Loader, LoaderEvent, PhotonTarget};
use futures::FutureExt;
use futures::future::BoxFuture;
use luminal_kernel::threads::{Halted, WorkerContext};
use std::collections::HashSet;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::debug;

type TaskFn = Box<dyn FnMut(Loader) -> BoxFuture<'static, ()> + Send>;

/// A scripted action run by the watch loop at a given iteration.
pub struct LoopTask {
    at_iteration: usize,
    task: TaskFn,
}

impl LoopTask {
    pub fn new<F, Fut>(at_iteration: usize, mut task: F) -> Self
    where
        F: FnMut(Loader) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            at_iteration,
            task: Box::new(move |loader| task(loader).boxed()),
        }
    }

    pub fn at_iteration(&self) -> usize {
        self.at_iteration
    }
}

impl std::fmt::Debug for LoopTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopTask")
            .field("at_iteration", &self.at_iteration)
            .finish_non_exhaustive()
    }
}

/// Deterministic driver for the watch loop.
///
/// An `iteration_limit` of zero never stops the loop.
#[derive(Debug, Default)]
pub struct LoopTrace {
    tasks: Vec<LoopTask>,
    iteration_limit: usize,
    current_iteration: usize,
}

impl LoopTrace {
    pub fn new(iteration_limit: usize) -> Self {
        Self {
            tasks: Vec::new(),
            iteration_limit,
            current_iteration: 0,
        }
    }

    pub fn with_task(mut self, task: LoopTask) -> Self {
        self.add_task(task);
        self
    }

    /// Schedule `task`; returns `false` if its iteration is already taken.
    pub fn add_task(&mut self, task: LoopTask) -> bool {
        if self.tasks.iter().any(|t| t.at_iteration == task.at_iteration) {
            return false;
        }
        self.tasks.push(task);
        true
    }

    pub fn remove_task(&mut self, at_iteration: usize) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.at_iteration != at_iteration);
        before != self.tasks.len()
    }

    pub fn tasks(&self) -> &[LoopTask] {
        &self.tasks
    }

    pub fn iteration_limit(&self) -> usize {
        self.iteration_limit
    }

    pub fn current_iteration(&self) -> usize {
        self.current_iteration
    }

    /// Run the task scheduled for the current iteration, then advance.
    pub async fn evaluate(&mut self, loader: &Loader) -> ControlFlow<()> {
        if self.iteration_limit > 0 && self.current_iteration >= self.iteration_limit {
            return ControlFlow::Break(());
        }

        let current = self.current_iteration;
        if let Some(task) = self.tasks.iter_mut().find(|t| t.at_iteration == current) {
            (task.task)(loader.clone()).await;
        }
        self.current_iteration += 1;
        ControlFlow::Continue(())
    }
}

/// Body of the watch worker.
pub(crate) async fn observe(
    loader: Loader,
    directory: PathBuf,
    trace: Option<LoopTrace>,
    ctx: WorkerContext,
) -> anyhow::Result<()> {
    let result = run_passes(&loader, &directory, trace, &ctx).await;
    loader.set_watching(false);
    loader
        .log()
        .info(format_args!("Stopped watching '{}'", directory.display()));
    result
}

async fn run_passes(
    loader: &Loader,
    directory: &Path,
    mut trace: Option<LoopTrace>,
    ctx: &WorkerContext,
) -> anyhow::Result<()> {
    let poll_interval = loader.config().poll_interval();
    let options = loader.default_options();

    while loader.is_watching() {
        ctx.checkpoint()?;

        let loaded = loader.loaded_paths().await;
        for path in discover(loader, directory, &loaded).await {
            loader.emit(LoaderEvent::Discovered { path: path.clone() });
            if let Err(err) = loader.load_one(&path, &options).await {
                loader
                    .log()
                    .error(format_args!("Failed to load '{}': {err}", path.display()));
            }
        }
        ctx.checkpoint()?;

        let changed = changed_sources(loader).await;
        if !changed.is_empty() {
            let targets = changed.into_iter().map(PhotonTarget::Path);
            for handle in loader.reload_many(targets).await? {
                loader.log().debug(format_args!(
                    "Successfully reloaded '{}'!",
                    handle.filepath().display()
                ));
            }
        }
        ctx.checkpoint()?;

        loader.start_all().await;

        if let Some(trace) = trace.as_mut() {
            if trace.evaluate(loader).await.is_break() {
                debug!("Watch loop reached its iteration limit");
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = ctx.halted() => return Err(Halted(ctx.id()).into()),
        }
    }

    Ok(())
}

/// Eligible direct children of `directory` that are not loaded yet.
async fn discover(loader: &Loader, directory: &Path, loaded: &HashSet<PathBuf>) -> Vec<PathBuf> {
    match loader.scan_directory(directory).await {
        Ok((files, _)) => files.into_iter().filter(|f| !loaded.contains(f)).collect(),
        Err(err) => {
            loader.log().error(format_args!(
                "Failed to scan '{}': {err}",
                directory.display()
            ));
            Vec::new()
        }
    }
}

/// Sources whose checksum no longer matches their handles.
///
/// Deleted sources are reported but left registered.
async fn changed_sources(loader: &Loader) -> Vec<PathBuf> {
    let block_size = loader.config().checksum_block_size;
    let mut changed: Vec<PathBuf> = Vec::new();

    for handle in loader.photons().await {
        let path = handle.filepath();
        if changed.iter().any(|p| p == path) {
            continue;
        }
        match Handle::compute_checksum(path, block_size).await {
            Ok(Some(checksum)) if Some(checksum.as_str()) != handle.checksum() => {
                changed.push(path.to_path_buf());
            }
            Ok(Some(_)) => {}
            Ok(None) => loader.log().debug(format_args!(
                "Source of photon '{}' is gone ({})",
                handle.name(),
                path.display()
            )),
            Err(err) => loader.log().error(format_args!(
                "Checksum of '{}' failed: {err}",
                path.display()
            )),
        }
    }
    changed
}
