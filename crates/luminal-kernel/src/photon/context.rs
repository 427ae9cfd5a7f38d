use crate::threads::{ThreadError, ThreadManager, WorkerContext};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resources owned by one loaded photon.
///
/// Factories receive the context of the handle they are instantiating.
/// Workers and child processes started through it are reclaimed when the
/// handle is force-stopped.
#[derive(Debug, Clone)]
pub struct PhotonContext {
    name: String,
    filepath: PathBuf,
    threads: Arc<ThreadManager>,
    processes: Arc<Mutex<Vec<Child>>>,
}

impl PhotonContext {
    pub fn new(name: impl Into<String>, filepath: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            threads: Arc::new(ThreadManager::new(format!("photon-{name}"))),
            name,
            filepath: filepath.into(),
            processes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    pub fn threads(&self) -> &Arc<ThreadManager> {
        &self.threads
    }

    /// Run `task` on a worker owned by this photon.
    pub fn spawn_worker<F>(&self, task: F) -> Result<(), ThreadError>
    where
        F: FnOnce(WorkerContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.threads.append(move |ctx, _: ()| task(ctx), ());
        match self.threads.run() {
            Ok(_) => Ok(()),
            // The task stays queued and starts on the next run.
            Err(ThreadError::LimitReached { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Spawn a child process owned by this photon; returns its pid.
    pub fn spawn_process(&self, command: &mut Command) -> std::io::Result<u32> {
        let child = command.spawn()?;
        let pid = child.id();
        debug!(photon = %self.name, pid, "Child process spawned");
        self.processes.lock().push(child);
        Ok(pid)
    }

    pub fn process_count(&self) -> usize {
        self.processes.lock().len()
    }

    /// Halt and join every worker; blocks until they have exited.
    pub fn halt_workers(&self) -> usize {
        self.threads.halt()
    }

    /// Kill and reap every child process.
    ///
    /// Returns the errors of children that could not be terminated.
    pub fn terminate_processes(&self) -> Vec<std::io::Error> {
        let children: Vec<Child> = self.processes.lock().drain(..).collect();
        let mut errors = Vec::new();
        for mut child in children {
            let pid = child.id();
            // Already-exited children report InvalidInput on kill.
            match child.kill() {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {}
                Err(err) => {
                    warn!(photon = %self.name, pid, "Failed to kill child process: {err}");
                    errors.push(err);
                    continue;
                }
            }
            if let Err(err) = child.wait() {
                warn!(photon = %self.name, pid, "Failed to reap child process: {err}");
                errors.push(err);
            }
        }
        errors
    }
}
