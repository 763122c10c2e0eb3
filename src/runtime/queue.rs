use crate::task::Job;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Mutex-protected FIFO for jobs that must only resume on thread 0.
///
/// Many producers, one consumer, low traffic relative to the mailbox
/// matrix — a conventional lock is the right tool here.
pub(crate) struct MainThreadQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl MainThreadQueue {
    pub(crate) fn new() -> MainThreadQueue {
        MainThreadQueue {
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    /// Swaps the whole queue out under the lock. The caller resumes the
    /// drained jobs *after* releasing it, so a resumed job can push new
    /// main-thread work without deadlocking.
    pub(crate) fn take_all(&self) -> VecDeque<Job> {
        std::mem::take(&mut *self.jobs.lock())
    }
}
