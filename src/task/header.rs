use crate::task::raw::JobCore;
use crate::task::state::State;
use crate::task::tracking::TrackingBlock;
use bitflags::bitflags;
use std::ptr::NonNull;
use std::sync::atomic::AtomicPtr;
use std::sync::Arc;

bitflags! {
    /// Options fixed at job creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct JobOpts: u8 {
        /// The job may only ever be resumed on thread 0. Routed through the
        /// main-thread queue instead of the mailbox matrix.
        const MAIN_THREAD = 1;
    }
}

/// Control block shared by every job frame.
///
/// `owner` and `opts` are written once at creation; the only fields mutated
/// concurrently are `state` and the `continuation` slot, both atomic.
pub(crate) struct Header {
    pub(super) state: State,

    /// Thread id that originally dispatched this job. Completion bookkeeping
    /// uses it to pick the local (non-atomic) counter over the remote one.
    pub(super) owner: usize,

    pub(super) opts: JobOpts,

    /// The job awaiting this one, if any. Registered by `JobHandle::poll`
    /// (raw `Arc<JobCore>` pointer), consumed by the resuming thread after
    /// every suspension or completion of this job.
    pub(super) continuation: AtomicPtr<JobCore>,

    /// Completion sink. Present only for jobs launched through a `JobList`.
    pub(super) tracking: Option<Arc<TrackingBlock>>,
}

impl Header {
    pub(super) fn new(owner: usize, opts: JobOpts, tracking: Option<Arc<TrackingBlock>>) -> Header {
        Header {
            state: State::new(),
            owner,
            opts,
            continuation: AtomicPtr::new(std::ptr::null_mut()),
            tracking,
        }
    }
}

impl Drop for Header {
    fn drop(&mut self) {
        // A frame torn down while a waiter is still registered (scheduler
        // shutdown with jobs in flight) must release that waiter's frame too.
        let ptr = *self.continuation.get_mut();
        if let Some(ptr) = NonNull::new(ptr) {
            // Safety: a non-null continuation slot always holds a pointer
            // produced by `Arc::into_raw` whose reference we own.
            drop(unsafe { Arc::from_raw(ptr.as_ptr()) });
        }
    }
}
