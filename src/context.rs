use crate::runtime::Shared;
use crate::task::{Job, JobCore};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Per-worker scheduling state: the thread's small integer id and its
/// round-robin routing cursor. One instance per participating thread, built
/// when the thread joins the scheduler and passed explicitly through every
/// routing and resume call.
pub(crate) struct WorkerContext {
    id: usize,

    /// Next mailbox row to route a pushed job to. Seeded one past our own id
    /// so a thread never routes its first job to itself.
    next_target: Cell<usize>,

    shared: Arc<Shared>,
}

impl WorkerContext {
    pub(crate) fn new(id: usize, shared: Arc<Shared>) -> WorkerContext {
        let next_target = Cell::new((id + 1) % shared.workers);
        WorkerContext {
            id,
            next_target,
            shared,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Returns the current routing target and advances the cursor.
    pub(crate) fn advance_target(&self) -> usize {
        let target = self.next_target.get();
        self.next_target.set((target + 1) % self.shared.workers);
        target
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("id", &self.id)
            .field("next_target", &self.next_target)
            .finish_non_exhaustive()
    }
}

thread_local! {
    /// The scheduler context of this thread, if it participates in one.
    ///
    /// Internals always receive `&WorkerContext` explicitly; this cell only
    /// serves the public entry points that are reached from inside a polled
    /// future (`spawn`, `JobHandle::poll`, `thread_id`) and therefore cannot
    /// be handed the context by parameter. One scheduler per thread at a
    /// time; the slot is vacated when that scheduler is torn down.
    static CONTEXT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };

    /// The job currently being polled on this thread, innermost resume first.
    /// `JobHandle::poll` reads it to register its caller as a continuation.
    static ACTIVE_JOB: Cell<Option<NonNull<JobCore>>> = const { Cell::new(None) };
}

/// Publishes `ctx` as this thread's scheduler context. Fails if the thread
/// already belongs to a scheduler.
pub(crate) fn install(ctx: WorkerContext) -> bool {
    CONTEXT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(ctx);
        true
    })
}

/// Vacates this thread's context if it belongs to `shared`, letting the
/// thread join another scheduler after this one is torn down (or after its
/// construction failed partway).
pub(crate) fn uninstall(shared: &Arc<Shared>) {
    CONTEXT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.as_ref().is_some_and(|ctx| Arc::ptr_eq(&ctx.shared, shared)) {
            *slot = None;
        }
    });
}

#[track_caller]
pub(crate) fn with<F, R>(f: F) -> R
where
    F: FnOnce(&WorkerContext) -> R,
{
    CONTEXT.with(|cell| {
        let slot = cell.borrow();
        let ctx = slot
            .as_ref()
            .expect("not called from a job scheduler thread");
        f(ctx)
    })
}

/// Marks `core` as the job being polled for the duration of the guard.
/// Nested resumes (a producer draining a displaced mailbox entry mid-poll)
/// stack and restore on drop.
pub(crate) fn enter_job(core: &Arc<JobCore>) -> ActiveJobGuard {
    let ptr = NonNull::from(&**core);
    let prev = ACTIVE_JOB.with(|cell| cell.replace(Some(ptr)));
    ActiveJobGuard { prev }
}

/// Handle to the innermost job currently being polled on this thread.
pub(crate) fn active_job() -> Option<Job> {
    // Safety: the pointer was published by `enter_job`, whose caller keeps a
    // strong reference alive for the guard's whole lifetime.
    ACTIVE_JOB
        .with(|cell| cell.get())
        .map(|ptr| unsafe { Job::clone_raw(ptr) })
}

pub(crate) struct ActiveJobGuard {
    prev: Option<NonNull<JobCore>>,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        ACTIVE_JOB.with(|cell| cell.set(self.prev));
    }
}
