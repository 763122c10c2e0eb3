use crate::context;
use crate::task::{new_job, Job, JobOpts, ResultSlot};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Launches `future` as a free-standing job on the calling thread's
/// scheduler and returns a handle that can be awaited from inside another
/// job.
///
/// The job starts independently of the handle: dropping the handle detaches
/// it (the job still runs to completion, its value is discarded). Must be
/// called on a scheduler thread, inside a running session.
pub fn spawn<F>(future: F) -> JobHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn_with(future, JobOpts::empty())
}

/// Like [`spawn`], but the job only ever resumes on thread 0.
pub fn spawn_main<F>(future: F) -> JobHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn_with(future, JobOpts::MAIN_THREAD)
}

fn spawn_with<F>(future: F, opts: JobOpts) -> JobHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    context::with(|ctx| {
        let (job, slot) = new_job(future, ctx.id(), opts, None);
        let handle = JobHandle {
            job: job.clone(),
            slot,
        };
        ctx.shared().schedule(ctx, job);
        handle
    })
}

/// An owned permission to await a job's completion and read its value.
///
/// Awaiting a `JobHandle` is the scheduler's only suspension point: the
/// awaiting job registers itself as the child's continuation and parks until
/// the child reaches its next suspension or completion point. A handle that
/// is awaited after the child already finished completes synchronously.
pub struct JobHandle<T> {
    job: Job,
    slot: Arc<ResultSlot<T>>,
}

impl<T> JobHandle<T> {
    /// Whether the job has reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.job.is_complete()
    }
}

impl<T> Unpin for JobHandle<T> {}

impl<T: Send + 'static> Future for JobHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<T> {
        if self.job.is_complete() {
            let value = self.slot.take().expect("job result already taken");
            return Poll::Ready(value);
        }

        let waiter = context::active_job().expect("JobHandle awaited outside of a job");
        let waiter_ptr = Arc::as_ptr(waiter.core());
        if let Some(prev) = self.job.register_continuation(waiter) {
            // The awaiter re-registered after a premature wake: polling
            // several handles at once (a join combinator) leaves this
            // registration outstanding when a sibling's suspension re-polls
            // the parent. Dropping the previous handle balances the
            // reference it carried.
            debug_assert!(
                std::ptr::eq(Arc::as_ptr(prev.core()), waiter_ptr),
                "a job may only have one awaiter"
            );
        }

        // Re-check after registering: the child may have completed between
        // the first check and the swap.
        if self.job.is_complete() {
            if self.job.take_continuation().is_some() {
                // We took our registration back before the completing thread
                // saw it; nobody will reschedule us, so finish inline.
                let value = self.slot.take().expect("job result already taken");
                return Poll::Ready(value);
            }
            // The completing thread claimed the registration and is
            // rescheduling us; report completion on the next poll.
        }

        Poll::Pending
    }
}

impl<T> std::fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(JobHandle<i32>: Send, Sync, Unpin);
}
