//! Typed errors for the thread manager.

use thiserror::Error;

/// Errors raised while queueing or starting workers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ThreadError {
    /// `run` was called while another drain of the queue was in progress.
    #[error("Thread manager is already running")]
    AlreadyRunning,

    /// `watch` was called while the watch loop was active.
    #[error("Thread manager is already watching its queue")]
    AlreadyWatching,

    /// Starting another worker would exceed the concurrency limit.
    #[error("Thread limit of {limit} has been reached, {remaining} task(s) left to start")]
    LimitReached {
        /// Configured concurrency limit.
        limit: usize,
        /// Tasks still waiting in the queue.
        remaining: usize,
    },

    /// `run` was called with an empty queue.
    #[error("No tasks have been queued")]
    NoTasksQueued,

    /// The operating system refused to spawn a thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
