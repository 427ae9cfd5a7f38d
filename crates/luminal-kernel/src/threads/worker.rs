use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Granularity of [`WorkerContext::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// A unit of work executed on a worker thread.
pub type TaskFn = Box<dyn FnOnce(WorkerContext) -> anyhow::Result<()> + Send + 'static>;

/// Lifecycle of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, task not entered yet.
    Requested,
    /// Task is executing.
    Running,
    /// Task returned `Ok`.
    Completed,
    /// Task unwound through a checkpoint after being halted.
    Halted,
    /// Task returned an error or panicked.
    Failed,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Halted | Self::Failed)
    }
}

/// Raised from a checkpoint once the worker has been halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker {0} was halted")]
pub struct Halted(pub Uuid);

/// Handle given to a task to observe its kill switch.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    id: Uuid,
    token: CancellationToken,
}

impl WorkerContext {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_halted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `Err(Halted)` once the worker has been halted.
    ///
    /// Tasks propagate it with `?` so the worker records a clean halt.
    pub fn checkpoint(&self) -> Result<(), Halted> {
        if self.token.is_cancelled() {
            Err(Halted(self.id))
        } else {
            Ok(())
        }
    }

    /// Resolves when the worker is halted.
    pub async fn halted(&self) {
        self.token.cancelled().await
    }

    /// Blocking sleep that wakes early when the worker is halted.
    pub fn sleep(&self, duration: Duration) -> Result<(), Halted> {
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A task running on its own OS thread.
pub struct Worker {
    id: Uuid,
    token: CancellationToken,
    state: Arc<Mutex<WorkerState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub(crate) fn spawn(id: Uuid, tag: &str, task: TaskFn) -> std::io::Result<Self> {
        let token = CancellationToken::new();
        let state = Arc::new(Mutex::new(WorkerState::Requested));
        let ctx = WorkerContext {
            id,
            token: token.clone(),
        };

        let thread_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name(format!("{tag}-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                *thread_state.lock() = WorkerState::Running;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(ctx)));
                let next = match outcome {
                    Ok(Ok(())) => WorkerState::Completed,
                    Ok(Err(err)) if err.is::<Halted>() => {
                        debug!(worker = %id, "Worker halted at checkpoint");
                        WorkerState::Halted
                    }
                    Ok(Err(err)) => {
                        warn!(worker = %id, "Worker task failed: {err:#}");
                        WorkerState::Failed
                    }
                    Err(_) => {
                        error!(worker = %id, "Worker task panicked");
                        WorkerState::Failed
                    }
                };
                *thread_state.lock() = next;
            })?;

        Ok(Self {
            id,
            token,
            state,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Whether the underlying thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// Trip the kill switch; the task unwinds at its next checkpoint.
    pub fn halt(&self) {
        self.token.cancel();
    }

    /// Wait for the thread to exit and return its final state.
    ///
    /// Joining from the worker's own thread returns immediately.
    pub fn join(&self) -> WorkerState {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                *self.handle.lock() = Some(handle);
                return self.state();
            }
            if handle.join().is_err() {
                *self.state.lock() = WorkerState::Failed;
            }
        }
        self.state()
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("halted", &self.token.is_cancelled())
            .finish()
    }
}
