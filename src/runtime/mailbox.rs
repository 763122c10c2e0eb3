use crate::task::{Job, JobCore};
use std::ptr::{null_mut, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// One single-slot handoff point between a specific producer thread and a
/// specific target thread.
///
/// Holding at most one pending job per (target, source) pair is the
/// scheduler's backpressure mechanism: a producer that displaces a
/// still-pending handle must resume the displaced job itself before moving
/// on.
pub(crate) struct MailboxCell {
    slot: AtomicPtr<JobCore>,
}

impl MailboxCell {
    fn new() -> MailboxCell {
        MailboxCell {
            slot: AtomicPtr::new(null_mut()),
        }
    }

    /// Deposits `job`, returning whatever pending job it displaced.
    ///
    /// Release on the exchange publishes the deposited frame to the
    /// claimant; acquire covers the displaced frame handed back to us.
    pub(crate) fn deposit(&self, job: Job) -> Option<Job> {
        let prev = self.slot.swap(job.into_raw(), Ordering::AcqRel);
        // Safety: non-null slot contents always carry one strong reference.
        NonNull::new(prev).map(|p| unsafe { Job::from_raw(p.as_ptr()) })
    }

    /// Claims the pending job, if any. A cheap peek load avoids the atomic
    /// exchange on the (common) empty cell.
    pub(crate) fn claim(&self) -> Option<Job> {
        if self.slot.load(Ordering::Acquire).is_null() {
            return None;
        }

        let prev = self.slot.swap(null_mut(), Ordering::AcqRel);
        // Safety: as in `deposit`.
        NonNull::new(prev).map(|p| unsafe { Job::from_raw(p.as_ptr()) })
    }
}

impl Drop for MailboxCell {
    fn drop(&mut self) {
        // Release the frame of a job that was never claimed (scheduler torn
        // down with work still posted).
        let ptr = *self.slot.get_mut();
        if let Some(ptr) = NonNull::new(ptr) {
            // Safety: as in `deposit`.
            drop(unsafe { Job::from_raw(ptr.as_ptr()) });
        }
    }
}

/// Fixed `N x N` grid of handoff cells: row = target thread, column = source
/// thread. The cells are the only structure mutated concurrently by
/// arbitrary thread pairs, and all mutation is a single atomic exchange.
pub(crate) struct MailboxMatrix {
    workers: usize,
    cells: Box<[MailboxCell]>,
}

impl MailboxMatrix {
    pub(crate) fn new(workers: usize) -> MailboxMatrix {
        MailboxMatrix {
            workers,
            cells: (0..workers * workers).map(|_| MailboxCell::new()).collect(),
        }
    }

    pub(crate) fn cell(&self, target: usize, source: usize) -> &MailboxCell {
        &self.cells[target * self.workers + source]
    }
}
