//! Cooperative job scheduler built on a lock-free mailbox matrix.
//!
//! A fixed pool of `N` worker threads hands suspendable jobs to each other
//! through an `N x N` grid of single-slot atomic cells — no shared queue, no
//! lock on the hot path. Jobs are futures resumed cooperatively: the only
//! suspension point is awaiting another job, and resumption flows through an
//! explicit continuation protocol instead of wakers.
//!
//! ```no_run
//! use carousel::{spawn, JobList, JobManager};
//!
//! let manager = JobManager::builder().worker_threads(4).build().unwrap();
//! manager.prepare_to_run_jobs();
//!
//! let mut jobs = JobList::new(&manager);
//! jobs.push_job(async {
//!     let child = spawn(async { 21 });
//!     child.await * 2
//! });
//! jobs.wait_for_completion();
//! assert_eq!(jobs[0], 42);
//!
//! manager.stop_running_jobs();
//! ```

mod context;
mod utils;

pub mod runtime;
pub mod task;

pub use runtime::{thread_id, BuildError, Builder, JobManager};
pub use task::{spawn, spawn_main, JobHandle, JobList};
