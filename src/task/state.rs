use std::sync::atomic::{AtomicU8, Ordering};

/// Suspended and not queued anywhere. The only references to the frame are
/// held by whoever may later wake it (a child's continuation slot, a
/// `JobHandle`, a `JobList` result slot).
const IDLE: u8 = 0;

/// Sitting in a mailbox cell, the main-thread queue, or about to be resumed
/// inline. Exactly one queue slot holds the frame.
const SCHEDULED: u8 = 1;

/// Claimed by a worker and currently being polled.
const RUNNING: u8 = 2;

/// Being polled, and a wakeup arrived mid-poll. The polling thread requeues
/// the job itself once the poll returns, instead of the waker enqueuing a
/// frame that is still exclusively held.
const NOTIFIED: u8 = 3;

/// Terminal. The frame is never polled again.
const COMPLETE: u8 = 4;

/// Per-job lifecycle word.
///
/// The mailbox matrix already guarantees that a queued handle is claimed by
/// at most one thread, but a Rust future can be woken *while it is being
/// polled* (its child may complete on another thread between the
/// continuation registration and the end of the poll). This word closes that
/// window: a wake against a RUNNING job only marks it NOTIFIED, and the
/// polling thread performs the requeue after it has released the frame.
#[derive(Debug)]
pub(crate) struct State(AtomicU8);

/// Outcome of trying to move a job onto a queue.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ScheduleAction {
    /// The job was IDLE and is now SCHEDULED; the caller must enqueue it.
    Enqueue,
    /// The job is already queued, running, or done. The thread holding it is
    /// responsible for any requeue; the caller drops its handle.
    Deferred,
}

/// Outcome of a poll that returned `Pending`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SuspendAction {
    /// No wakeup arrived during the poll; the job parks until a continuation
    /// routes it again.
    Park,
    /// A wakeup arrived mid-poll. The job is already marked SCHEDULED and the
    /// polling thread must enqueue it.
    Requeue,
}

impl State {
    pub(crate) fn new() -> State {
        State(AtomicU8::new(IDLE))
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire) == COMPLETE
    }

    pub(crate) fn transition_to_scheduled(&self) -> ScheduleAction {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => SCHEDULED,
                RUNNING => NOTIFIED,
                // Already queued, already notified, or already finished.
                SCHEDULED | NOTIFIED | COMPLETE => return ScheduleAction::Deferred,
                _ => unreachable!("invalid job state {current}"),
            };

            match self
                .0
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) if next == SCHEDULED => return ScheduleAction::Enqueue,
                Ok(_) => return ScheduleAction::Deferred,
                Err(actual) => current = actual,
            }
        }
    }

    /// Claims the job for polling. The claim is exclusive: the caller took
    /// the only queued handle, so the CAS cannot race with another claimant.
    pub(crate) fn transition_to_running(&self) {
        let prev = self
            .0
            .compare_exchange(SCHEDULED, RUNNING, Ordering::AcqRel, Ordering::Acquire);
        assert!(
            prev.is_ok(),
            "claimed a job that was not scheduled (state {})",
            prev.unwrap_err()
        );
    }

    pub(crate) fn transition_to_suspended(&self) -> SuspendAction {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let (next, action) = match current {
                RUNNING => (IDLE, SuspendAction::Park),
                NOTIFIED => (SCHEDULED, SuspendAction::Requeue),
                _ => unreachable!("suspended a job that was not running (state {current})"),
            };

            match self
                .0
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return action,
                Err(actual) => current = actual,
            }
        }
    }

    /// Marks the job terminal. Release ordering publishes the result slot
    /// write to whichever thread observes completion.
    pub(crate) fn transition_to_complete(&self) {
        let prev = self.0.swap(COMPLETE, Ordering::AcqRel);
        debug_assert!(
            prev == RUNNING || prev == NOTIFIED,
            "completed a job that was not running (state {prev})"
        );
    }
}
