//! Bounded worker threads with a cooperative kill switch.
//!
//! A [`ThreadManager`] queues units of work, starts them on dedicated OS
//! threads up to a concurrency limit and can either signal every worker to
//! stop gracefully or halt them outright.
//!
//! Halting is cooperative: every task receives a [`WorkerContext`] whose
//! [`checkpoint`](WorkerContext::checkpoint) starts failing with [`Halted`]
//! once the worker is halted. Code that never reaches a checkpoint (a
//! blocking syscall, a long native call) finishes that call before it can
//! observe the halt.
//!
//! ```rust,ignore
//! use luminal_kernel::threads::ThreadManager;
//!
//! let manager = ThreadManager::new("indexer").with_thread_limit(2);
//! manager.append(|ctx, rounds: usize| {
//!     for _ in 0..rounds {
//!         ctx.checkpoint()?;
//!         do_some_work();
//!     }
//!     Ok(())
//! }, 100);
//! manager.run()?;
//! manager.halt();
//! ```

mod error;
mod manager;
mod worker;

pub use error::ThreadError;
pub use manager::{DEFAULT_POLL_INTERVAL, DEFAULT_THREAD_LIMIT, ThreadManager};
pub use worker::{Halted, TaskFn, Worker, WorkerContext, WorkerState};

#[cfg(test)]
mod tests;
