use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// One completion-counter pair per worker thread.
///
/// Slot `t` is only ever *written* by thread `t`: `local` counts jobs that
/// thread `t` completed and also originally dispatched, `remote` counts jobs
/// it completed on behalf of another owner. This keeps the overwhelmingly
/// common case (a thread finishing its own batch's work) off the atomic, and
/// leaves `remote` a single-writer counter that only needs release/acquire
/// for cross-thread visibility.
///
/// Padded to a cache line; both counters are bumped on the completion hot
/// path.
#[repr(C, align(64))]
struct TrackingSlot {
    local: Cell<u64>,
    remote: AtomicU64,
}

// Safety: `local` is only accessed by the thread the slot belongs to
// (`record` indexes by the *current* thread id, `completed_from` only reads
// the caller's own local slot).
unsafe impl Sync for TrackingSlot {}

/// Per-batch completion counters, one slot per worker thread.
///
/// The sum scheme only balances when every job in the batch was dispatched
/// by the thread that waits on it, which `JobList` enforces by being pinned
/// to its creating thread.
pub(crate) struct TrackingBlock {
    slots: Box<[TrackingSlot]>,
}

impl TrackingBlock {
    pub(crate) fn new(workers: usize) -> TrackingBlock {
        TrackingBlock {
            slots: (0..workers)
                .map(|_| TrackingSlot {
                    local: Cell::new(0),
                    remote: AtomicU64::new(0),
                })
                .collect(),
        }
    }

    /// Records one completion performed by thread `current` for a job
    /// dispatched by thread `owner`.
    ///
    /// The release on `remote` orders the job's result-slot write before the
    /// counter bump, so a waiter that has seen the count may read results
    /// without further synchronization.
    pub(crate) fn record(&self, current: usize, owner: usize) {
        let slot = &self.slots[current];
        if current == owner {
            slot.local.set(slot.local.get() + 1);
        } else {
            slot.remote.fetch_add(1, Ordering::Release);
        }
    }

    /// Total completions visible to thread `me`: its own local counter plus
    /// every other thread's remote counter.
    pub(crate) fn completed_from(&self, me: usize) -> u64 {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                if i == me {
                    slot.local.get()
                } else {
                    slot.remote.load(Ordering::Acquire)
                }
            })
            .sum()
    }
}
