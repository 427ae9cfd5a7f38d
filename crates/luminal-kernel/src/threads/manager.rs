use super::error::ThreadError;
use super::worker::{TaskFn, Worker, WorkerContext, WorkerState};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default concurrency limit.
pub const DEFAULT_THREAD_LIMIT: usize = 10;

/// Default pause between passes of the watch loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

struct QueuedTask {
    id: Uuid,
    task: TaskFn,
}

/// Resets a flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Queues tasks and runs them on at most `thread_limit` worker threads.
///
/// A task id is either queued or running, never both.
pub struct ThreadManager {
    uid: Uuid,
    name: String,
    thread_limit: AtomicUsize,
    poll_interval: Duration,
    queue: Mutex<VecDeque<QueuedTask>>,
    running: Mutex<HashMap<Uuid, Worker>>,
    stop_requested: AtomicBool,
    currently_running: AtomicBool,
    currently_watching: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.into(),
            thread_limit: AtomicUsize::new(DEFAULT_THREAD_LIMIT),
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue: Mutex::new(VecDeque::new()),
            running: Mutex::new(HashMap::new()),
            stop_requested: AtomicBool::new(false),
            currently_running: AtomicBool::new(false),
            currently_watching: AtomicBool::new(false),
            watcher: Mutex::new(None),
        }
    }

    pub fn with_thread_limit(self, limit: usize) -> Self {
        self.set_thread_limit(limit);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_limit(&self) -> usize {
        self.thread_limit.load(Ordering::SeqCst)
    }

    /// Change the concurrency limit. Values below one are clamped to one.
    pub fn set_thread_limit(&self, limit: usize) {
        self.thread_limit.store(limit.max(1), Ordering::SeqCst);
    }

    pub fn queued_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Workers currently tracked, finished ones included until pruned.
    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.currently_running.load(Ordering::SeqCst)
    }

    pub fn is_watching(&self) -> bool {
        self.currently_watching.load(Ordering::SeqCst)
    }

    pub fn running_ids(&self) -> Vec<Uuid> {
        self.running.lock().keys().copied().collect()
    }

    pub fn worker_state(&self, id: Uuid) -> Option<WorkerState> {
        self.running.lock().get(&id).map(Worker::state)
    }

    /// Queue `function(ctx, args)` under a fresh id.
    ///
    /// Always returns `true`; v4 ids are generated infallibly.
    pub fn append<F, A>(&self, function: F, args: A) -> bool
    where
        F: FnOnce(WorkerContext, A) -> anyhow::Result<()> + Send + 'static,
        A: Send + 'static,
    {
        let id = Uuid::new_v4();
        self.queue.lock().push_back(QueuedTask {
            id,
            task: Box::new(move |ctx| function(ctx, args)),
        });
        debug!(manager = %self.name, task = %id, "Task queued");
        true
    }

    /// Start queued tasks until the queue is empty or the limit is hit.
    ///
    /// Finished workers are pruned first so their slots can be reused.
    /// Returns the number of workers started.
    pub fn run(&self) -> Result<usize, ThreadError> {
        if self.currently_running.swap(true, Ordering::SeqCst) {
            return Err(ThreadError::AlreadyRunning);
        }
        let _guard = FlagGuard(&self.currently_running);

        self.prune();

        let mut queue = self.queue.lock();
        if queue.is_empty() {
            return Err(ThreadError::NoTasksQueued);
        }

        let limit = self.thread_limit();
        let mut started = 0;
        while let Some(queued) = queue.pop_front() {
            let mut running = self.running.lock();
            if running.len() >= limit {
                queue.push_front(queued);
                let remaining = queue.len();
                debug!(manager = %self.name, limit, remaining, "Thread limit reached");
                return Err(ThreadError::LimitReached { limit, remaining });
            }

            let id = queued.id;
            let worker = Worker::spawn(id, &self.name, queued.task)?;
            running.insert(id, worker);
            started += 1;
        }

        Ok(started)
    }

    /// Spawn a background loop that keeps draining the queue until
    /// [`stop`](Self::stop) is called, then clears both collections.
    pub fn watch(self: &Arc<Self>) -> Result<(), ThreadError> {
        if self.currently_watching.swap(true, Ordering::SeqCst) {
            return Err(ThreadError::AlreadyWatching);
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let manager = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("{}-watch", self.name))
            .spawn(move || manager.watch_loop());

        match spawned {
            Ok(handle) => {
                *self.watcher.lock() = Some(handle);
                info!(manager = %self.name, "Watching task queue");
                Ok(())
            }
            Err(err) => {
                self.currently_watching.store(false, Ordering::SeqCst);
                Err(ThreadError::Spawn(err))
            }
        }
    }

    fn watch_loop(&self) {
        while !self.stop_requested.load(Ordering::SeqCst) {
            match self.run() {
                Ok(_) | Err(ThreadError::NoTasksQueued) | Err(ThreadError::AlreadyRunning) => {}
                Err(ThreadError::LimitReached { .. }) => {
                    self.prune();
                }
                Err(err) => warn!(manager = %self.name, "Watch loop failed to start task: {err}"),
            }
            thread::park_timeout(self.poll_interval);
        }

        self.queue.lock().clear();
        self.running.lock().clear();
        self.currently_watching.store(false, Ordering::SeqCst);
        info!(manager = %self.name, "Stopped watching task queue");
    }

    /// Ask the watch loop to exit after its current pass.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.watcher.lock().as_ref() {
            handle.thread().unpark();
        }
    }

    /// Halt a single running worker and wait for it.
    pub fn halt_worker(&self, id: Uuid) -> Option<WorkerState> {
        let worker = self.running.lock().remove(&id)?;
        worker.halt();
        Some(worker.join())
    }

    /// Halt every running worker, then join each one.
    ///
    /// Returns the number of workers reclaimed.
    pub fn halt(&self) -> usize {
        let workers: Vec<Worker> = self.running.lock().drain().map(|(_, w)| w).collect();
        for worker in &workers {
            worker.halt();
        }
        for worker in &workers {
            let state = worker.join();
            debug!(manager = %self.name, worker = %worker.id(), ?state, "Worker reclaimed");
        }
        workers.len()
    }

    /// Drop finished workers from the running set.
    pub fn prune(&self) -> usize {
        let mut running = self.running.lock();
        let before = running.len();
        running.retain(|_, worker| !worker.is_finished());
        before - running.len()
    }
}

impl std::fmt::Debug for ThreadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadManager")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("thread_limit", &self.thread_limit())
            .field("queued", &self.queued_count())
            .field("running", &self.running_count())
            .finish()
    }
}
