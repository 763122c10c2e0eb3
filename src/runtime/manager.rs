use crate::context::{self, WorkerContext};
use crate::runtime::mailbox::MailboxMatrix;
use crate::runtime::queue::MainThreadQueue;
use crate::runtime::MAIN_THREAD_ID;
use crate::task::{Job, ScheduleAction, SuspendAction, TrackingBlock};
use crate::utils::Semaphore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::thread;

pub(crate) type WorkerStartFn = Arc<dyn Fn(usize) + Send + Sync + 'static>;

/// State shared by every scheduler thread: the handoff structures, the
/// session flags, and the idle gate.
pub(crate) struct Shared {
    pub(crate) workers: usize,

    pub(crate) matrix: MailboxMatrix,

    pub(crate) main_queue: MainThreadQueue,

    /// Set between `prepare_to_run_jobs` and `stop_running_jobs`. Workers
    /// busy-spin on their mailbox row while it holds.
    pub(crate) running: AtomicBool,

    pub(crate) quit: AtomicBool,

    /// Workers block here between running sessions.
    pub(crate) idle: Semaphore,

    /// Called once on every scheduler thread at startup, before it processes
    /// any work. The hook is how callers bind per-thread resources (e.g. a
    /// thread-local frame allocator) to the pool.
    pub(crate) on_worker_start: Option<WorkerStartFn>,
}

impl Shared {
    pub(crate) fn new(workers: usize, on_worker_start: Option<WorkerStartFn>) -> Shared {
        Shared {
            workers,
            matrix: MailboxMatrix::new(workers),
            main_queue: MainThreadQueue::new(),
            running: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            idle: Semaphore::new(0),
            on_worker_start,
        }
    }

    /// Moves `job` toward execution, respecting its lifecycle state: an idle
    /// job is enqueued, a job that is currently being polled is only marked
    /// notified (its poller requeues it).
    pub(crate) fn schedule(&self, ctx: &WorkerContext, job: Job) {
        match job.transition_to_scheduled() {
            ScheduleAction::Enqueue => self.dispatch(ctx, job),
            ScheduleAction::Deferred => {}
        }
    }

    /// Enqueues a job that already holds the SCHEDULED claim.
    fn dispatch(&self, ctx: &WorkerContext, job: Job) {
        if job.is_main_thread() {
            self.push_main_thread_job(job);
        } else {
            self.push_job(ctx, job);
        }
    }

    /// Posts `job` to another thread through the mailbox matrix.
    ///
    /// The target is picked by the posting thread's round-robin cursor. If
    /// the exchange displaces a still-pending job, the posting thread
    /// resumes the displaced job itself before continuing — occupancy stays
    /// at one job per (target, source) pair and forward progress never
    /// depends on the target thread.
    pub(crate) fn push_job(&self, ctx: &WorkerContext, job: Job) {
        if self.workers == 1 {
            // Nobody to hand off to; posting degenerates to resuming inline.
            self.resume(ctx, job);
            return;
        }

        assert!(
            self.running.load(Ordering::Acquire),
            "job pushed outside a running session"
        );

        let target = ctx.advance_target();
        if let Some(displaced) = self.matrix.cell(target, ctx.id()).deposit(job) {
            self.resume(ctx, displaced);
        }
    }

    pub(crate) fn push_main_thread_job(&self, job: Job) {
        assert!(
            self.running.load(Ordering::Relaxed),
            "main-thread job pushed outside a running session"
        );
        self.main_queue.push(job);
    }

    /// Resumes `job` one step and runs the continuation/completion protocol:
    ///
    /// 1. Poll until the job suspends or completes.
    /// 2. Route its registered awaiter, if any, honoring main-thread
    ///    affinity.
    /// 3. On completion, bump the tracking-block counter for the current
    ///    thread — the plain local counter when this thread also dispatched
    ///    the job, the atomic remote counter otherwise.
    ///
    /// Fire-and-forget frames die here: the scheduler held the last strong
    /// reference. Value frames stay alive through their handle or list slot.
    pub(crate) fn resume(&self, ctx: &WorkerContext, job: Job) {
        job.transition_to_running();

        let poll = {
            let _active = context::enter_job(job.core());
            job.poll()
        };

        match poll {
            Poll::Ready(()) => {
                job.transition_to_complete();

                if let Some(block) = job.tracking() {
                    block.record(ctx.id(), job.owner());
                }

                if let Some(waiter) = job.take_continuation() {
                    self.schedule(ctx, waiter);
                }
            }
            Poll::Pending => {
                let requeue = job.transition_to_suspended() == SuspendAction::Requeue;

                if let Some(waiter) = job.take_continuation() {
                    self.schedule(ctx, waiter);
                }

                if requeue {
                    // A wakeup landed while we were polling; the job already
                    // holds the SCHEDULED claim.
                    self.dispatch(ctx, job);
                }
            }
        }
    }

    /// Scans this thread's mailbox row and resumes at most one claimed job.
    /// Returns whether any work was found.
    pub(crate) fn process_job_list(&self, ctx: &WorkerContext) -> bool {
        for source in 0..self.workers {
            if let Some(job) = self.matrix.cell(ctx.id(), source).claim() {
                self.resume(ctx, job);
                return true;
            }
        }
        false
    }

    /// Participating join: processes scheduler work on the calling thread
    /// until `tracking` reports `target` completions.
    ///
    /// The caller never blocks — it keeps draining its own mailbox row (and
    /// the main-thread queue, if it is thread 0), so waiting cannot deadlock
    /// even when the batch depends on main-thread-affine jobs.
    pub(crate) fn run_jobs(&self, ctx: &WorkerContext, tracking: &TrackingBlock, target: u64) {
        loop {
            self.process_job_list(ctx);

            if ctx.id() == MAIN_THREAD_ID {
                for job in self.main_queue.take_all() {
                    self.resume(ctx, job);
                }
            }

            if tracking.completed_from(ctx.id()) == target {
                return;
            }
        }
    }
}

/// The scheduler instance: owns the shared state and the `N - 1` worker
/// threads (the constructing thread is worker 0, the "main thread").
///
/// Built once at application start via [`Builder`](crate::Builder), passed
/// by reference to every call site that launches work, and dropped at
/// shutdown — never a process-wide static.
pub struct JobManager {
    shared: Arc<Shared>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl JobManager {
    pub fn builder() -> crate::runtime::Builder {
        crate::runtime::Builder::new()
    }

    pub(crate) fn from_parts(shared: Arc<Shared>, threads: Vec<thread::JoinHandle<()>>) -> JobManager {
        JobManager { shared, threads }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Opens a running session: sets the running flag and releases every
    /// worker past its idle wait. Must be balanced with
    /// [`stop_running_jobs`](JobManager::stop_running_jobs).
    pub fn prepare_to_run_jobs(&self) {
        self.shared.running.store(true, Ordering::Release);
        self.shared.idle.release(self.shared.workers - 1);
        tracing::debug!("running session started");
    }

    /// Closes the running session. Workers finish their in-progress resume
    /// and fall back to idling on the semaphore; nothing is interrupted.
    pub fn stop_running_jobs(&self) {
        self.shared.running.store(false, Ordering::Release);
        tracing::debug!("running session stopped");
    }

    /// Size of the fixed worker pool, including the main thread.
    pub fn worker_threads(&self) -> usize {
        self.shared.workers
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        assert!(
            !self.shared.running.load(Ordering::Acquire),
            "job manager dropped during a running session"
        );

        self.shared.quit.store(true, Ordering::Relaxed);
        self.shared.idle.release(self.shared.workers - 1);

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        // Free the dropping thread to build or join another scheduler. Worker
        // threads exited above; a drop on an unrelated thread is a no-op.
        context::uninstall(&self.shared);
    }
}

/// The calling thread's scheduler id, `0..N`. Id 0 is the thread that built
/// the manager and performs main-thread work.
///
/// Panics when called from a thread that does not belong to a scheduler.
#[track_caller]
pub fn thread_id() -> usize {
    context::with(|ctx| ctx.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Shared: Send, Sync);
    assert_impl_all!(JobManager: Send);
}
