use crate::context;
use crate::runtime::{JobManager, Shared};
use crate::task::{new_job, JobOpts, ResultSlot, TrackingBlock};
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Index;
use std::sync::Arc;

/// A batch-launch-and-join handle over a group of jobs sharing one tracking
/// block.
///
/// All jobs in the batch are dispatched by the creating thread, which is
/// also the thread that must call [`wait_for_completion`] — the waiting
/// thread keeps participating as an ordinary worker until every job in the
/// batch has completed, so waiting never deadlocks even when the batch
/// contains main-thread-affine work and the waiter is thread 0.
///
/// The local/remote completion-counter scheme only balances when the batch
/// has a single dispatching thread, so a `JobList` is pinned to the thread
/// that created it (`!Send`/`!Sync`).
///
/// [`wait_for_completion`]: JobList::wait_for_completion
pub struct JobList<T> {
    shared: Arc<Shared>,
    tracking: Arc<TrackingBlock>,
    results: Vec<Arc<ResultSlot<T>>>,
    owner: usize,
    waited: bool,

    _pinned_to_thread: PhantomData<*const ()>,
}

impl<T: Send + 'static> JobList<T> {
    /// Creates an empty batch on `manager`. Must be called from one of the
    /// manager's scheduler threads.
    pub fn new(manager: &JobManager) -> JobList<T> {
        let shared = Arc::clone(manager.shared());
        let owner = context::with(|ctx| {
            assert!(
                Arc::ptr_eq(ctx.shared(), &shared),
                "job list created on a thread belonging to a different scheduler"
            );
            ctx.id()
        });

        JobList {
            tracking: Arc::new(TrackingBlock::new(shared.workers)),
            results: Vec::new(),
            owner,
            waited: false,
            shared,
            _pinned_to_thread: PhantomData,
        }
    }

    /// Launches one job as part of this batch.
    pub fn push_job<F>(&mut self, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.push(future, JobOpts::empty());
    }

    /// Launches one job that may only resume on thread 0.
    pub fn push_main_thread_job<F>(&mut self, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.push(future, JobOpts::MAIN_THREAD);
    }

    fn push<F>(&mut self, future: F, opts: JobOpts)
    where
        F: Future<Output = T> + Send + 'static,
    {
        assert!(
            !self.waited,
            "job pushed into a job list that was already waited on"
        );

        context::with(|ctx| {
            assert_eq!(
                ctx.id(),
                self.owner,
                "job list used from a different thread than it was created on"
            );

            let (job, slot) = new_job(future, self.owner, opts, Some(Arc::clone(&self.tracking)));
            self.results.push(slot);
            self.shared.schedule(ctx, job);
        });
    }

    /// Blocks until every job pushed into this batch has completed.
    ///
    /// The calling thread processes scheduler work (its own mailbox row, and
    /// the main-thread queue if it is thread 0) while it waits. Returns
    /// immediately for an empty batch, and on repeated calls.
    pub fn wait_for_completion(&mut self) {
        if self.waited || self.results.is_empty() {
            self.waited = true;
            return;
        }

        let target = self.results.len() as u64;
        context::with(|ctx| self.shared.run_jobs(ctx, &self.tracking, target));
        self.waited = true;
    }

    /// Number of jobs pushed into the batch.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<T: Send + 'static> Index<usize> for JobList<T> {
    type Output = T;

    /// Reads the result of the `index`-th pushed job. Only valid after
    /// [`wait_for_completion`](JobList::wait_for_completion).
    fn index(&self, index: usize) -> &T {
        assert!(
            self.waited,
            "job results are only available after wait_for_completion"
        );
        self.results[index]
            .peek()
            .expect("job completed without storing a result")
    }
}

impl<T> Drop for JobList<T> {
    fn drop(&mut self) {
        // Tearing the batch down with jobs still in flight indicates a race
        // the design assumes cannot occur in correct client code.
        assert!(
            self.waited || self.results.is_empty(),
            "job list dropped before wait_for_completion"
        );
    }
}
