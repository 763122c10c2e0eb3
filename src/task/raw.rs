use crate::task::header::{Header, JobOpts};
use crate::task::state::{ScheduleAction, SuspendAction};
use crate::task::tracking::TrackingBlock;
use futures::task::noop_waker_ref;
use std::cell::UnsafeCell;
use std::future::Future;
use std::pin::Pin;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A job frame: control block plus the type-erased suspendable computation.
///
/// Value-returning jobs write their output into a separate `ResultSlot`
/// before finishing, so the erased future is always `Output = ()`.
pub(crate) struct JobCore {
    pub(super) header: Header,
    future: UnsafeCell<JobFuture>,
}

// Safety: the future is only ever touched through `Job::poll`, and the state
// word guarantees at most one thread holds the RUNNING claim at a time. All
// other fields are atomic or written once at creation.
unsafe impl Send for JobCore {}
unsafe impl Sync for JobCore {}

/// Refcounted handle to a job frame.
///
/// The scheduler moves these in and out of atomic slots as raw pointers; a
/// raw pointer always carries exactly one strong reference.
#[derive(Clone)]
pub(crate) struct Job {
    core: Arc<JobCore>,
}

impl Job {
    fn new(
        future: JobFuture,
        owner: usize,
        opts: JobOpts,
        tracking: Option<Arc<TrackingBlock>>,
    ) -> Job {
        Job {
            core: Arc::new(JobCore {
                header: Header::new(owner, opts, tracking),
                future: UnsafeCell::new(future),
            }),
        }
    }

    pub(crate) fn from_core(core: Arc<JobCore>) -> Job {
        Job { core }
    }

    pub(crate) fn core(&self) -> &Arc<JobCore> {
        &self.core
    }

    /// Consumes the handle, transferring its strong reference to the caller.
    pub(crate) fn into_raw(self) -> *mut JobCore {
        Arc::into_raw(self.core).cast_mut()
    }

    /// Safety: `ptr` must come from `Job::into_raw` and carry an untransferred
    /// strong reference.
    pub(crate) unsafe fn from_raw(ptr: *mut JobCore) -> Job {
        Job {
            core: unsafe { Arc::from_raw(ptr) },
        }
    }

    /// Safety: `ptr` must point to a live `JobCore` (one kept alive for the
    /// duration of this call by an existing strong reference).
    pub(crate) unsafe fn clone_raw(ptr: NonNull<JobCore>) -> Job {
        unsafe {
            Arc::increment_strong_count(ptr.as_ptr());
            Job {
                core: Arc::from_raw(ptr.as_ptr()),
            }
        }
    }

    /// Polls the job's future one step.
    ///
    /// The waker is a no-op: the scheduler never relies on waker-driven
    /// wakeups, resumption always flows through the continuation protocol.
    ///
    /// Safety contract (checked by the state word): the caller holds the
    /// RUNNING claim, making this the only live `&mut` into the future.
    pub(crate) fn poll(&self) -> Poll<()> {
        let mut cx = Context::from_waker(noop_waker_ref());
        unsafe { (*self.core.future.get()).as_mut().poll(&mut cx) }
    }

    pub(crate) fn owner(&self) -> usize {
        self.core.header.owner
    }

    pub(crate) fn is_main_thread(&self) -> bool {
        self.core.header.opts.contains(JobOpts::MAIN_THREAD)
    }

    pub(crate) fn tracking(&self) -> Option<&TrackingBlock> {
        self.core.header.tracking.as_deref()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.core.header.state.is_complete()
    }

    pub(crate) fn transition_to_scheduled(&self) -> ScheduleAction {
        self.core.header.state.transition_to_scheduled()
    }

    pub(crate) fn transition_to_running(&self) {
        self.core.header.state.transition_to_running();
    }

    pub(crate) fn transition_to_suspended(&self) -> SuspendAction {
        self.core.header.state.transition_to_suspended()
    }

    pub(crate) fn transition_to_complete(&self) {
        self.core.header.state.transition_to_complete();
    }

    /// Registers `waiter` to be routed at this job's next suspension or
    /// completion point. Returns a previously registered waiter, if any.
    pub(crate) fn register_continuation(&self, waiter: Job) -> Option<Job> {
        let prev = self
            .core
            .header
            .continuation
            .swap(waiter.into_raw(), Ordering::AcqRel);
        // Safety: non-null slot contents are always `into_raw` pointers.
        NonNull::new(prev).map(|p| unsafe { Job::from_raw(p.as_ptr()) })
    }

    pub(crate) fn take_continuation(&self) -> Option<Job> {
        let prev = self
            .core
            .header
            .continuation
            .swap(std::ptr::null_mut(), Ordering::AcqRel);
        // Safety: as above.
        NonNull::new(prev).map(|p| unsafe { Job::from_raw(p.as_ptr()) })
    }
}

/// Write-once output cell shared between a job's wrapper future and the
/// `JobHandle`/`JobList` that reads the value out.
pub(crate) struct ResultSlot<T> {
    ready: std::sync::atomic::AtomicBool,
    value: UnsafeCell<Option<T>>,
}

// Safety: `value` is written exactly once, before the release store of
// `ready`; readers only touch it after an acquire load observes the store.
unsafe impl<T: Send> Send for ResultSlot<T> {}
unsafe impl<T: Send> Sync for ResultSlot<T> {}

impl<T> ResultSlot<T> {
    fn new() -> ResultSlot<T> {
        ResultSlot {
            ready: std::sync::atomic::AtomicBool::new(false),
            value: UnsafeCell::new(None),
        }
    }

    pub(crate) fn put(&self, value: T) {
        // Safety: single writer (the job's own poll), runs before `ready`.
        unsafe {
            *self.value.get() = Some(value);
        }
        self.ready.store(true, Ordering::Release);
    }

    pub(crate) fn take(&self) -> Option<T> {
        if !self.ready.load(Ordering::Acquire) {
            return None;
        }
        // Safety: publication ordered by `ready`; the caller owns the handle
        // side of the slot, so there is a single consumer.
        unsafe { (*self.value.get()).take() }
    }

    pub(crate) fn peek(&self) -> Option<&T> {
        if !self.ready.load(Ordering::Acquire) {
            return None;
        }
        // Safety: as in `take`, and nothing writes after `ready` is set.
        unsafe { (*self.value.get()).as_ref() }
    }
}

/// Builds a job frame around `future`, wiring its output into a fresh result
/// slot.
pub(crate) fn new_job<F>(
    future: F,
    owner: usize,
    opts: JobOpts,
    tracking: Option<Arc<TrackingBlock>>,
) -> (Job, Arc<ResultSlot<F::Output>>)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let slot = Arc::new(ResultSlot::new());
    let out = Arc::clone(&slot);
    let wrapped = async move {
        out.put(future.await);
    };

    (Job::new(Box::pin(wrapped), owner, opts, tracking), slot)
}
