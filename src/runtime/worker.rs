use crate::context::{self, WorkerContext};
use crate::runtime::manager::Shared;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Body of worker threads `1..N`.
///
/// Outer loop: block on the idle semaphore between running sessions. Inner
/// loop: drain our mailbox row for as long as the session lasts, spinning
/// when no work is found — idle CPU is deliberately traded for minimum
/// handoff latency within a session.
pub(crate) fn worker_main(id: usize, shared: Arc<Shared>) {
    if let Some(hook) = &shared.on_worker_start {
        hook(id);
    }

    let installed = context::install(WorkerContext::new(id, Arc::clone(&shared)));
    assert!(installed, "worker thread already belongs to a scheduler");

    context::with(|ctx| {
        tracing::trace!(id, "worker started");

        while !shared.quit.load(Ordering::Relaxed) {
            shared.idle.acquire();

            while shared.running.load(Ordering::Acquire) {
                if !shared.process_job_list(ctx) {
                    std::hint::spin_loop();
                }
            }
        }

        tracing::trace!(id, "worker exited");
    });
}
