//! The scheduler proper: manager lifecycle, mailbox routing, worker loops.

mod builder;
mod mailbox;
mod manager;
mod queue;
mod worker;

pub use builder::{BuildError, Builder};
pub use manager::{thread_id, JobManager};

pub(crate) use manager::Shared;

/// Thread id reserved for the thread that builds the manager and performs
/// application main-thread work.
pub(crate) const MAIN_THREAD_ID: usize = 0;

#[cfg(test)]
mod tests;
