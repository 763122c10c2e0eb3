use crate::context::{self, WorkerContext};
use crate::runtime::manager::{JobManager, Shared, WorkerStartFn};
use crate::runtime::{worker, MAIN_THREAD_ID};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(1));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("carousel-worker-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// A scheduler construction failure. No partially built pool survives an
/// error: workers spawned before the failure are torn down first.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("this thread already belongs to a job scheduler")]
    ThreadTaken,
}

/// Configures and constructs a [`JobManager`].
///
/// The calling thread becomes worker 0 ("main thread"); `N - 1` additional
/// worker threads are spawned, each parked on the idle semaphore until the
/// first running session opens.
pub struct Builder {
    /// Defaults to one worker per CPU core.
    worker_threads: Option<usize>,

    /// Name fn for spawned worker threads.
    thread_name: ThreadNameFn,

    /// Stack size for spawned worker threads.
    thread_stack_size: Option<usize>,

    /// Per-thread startup hook, called with the worker id.
    on_worker_start: Option<WorkerStartFn>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            on_worker_start: None,
        }
    }

    /// Sets the total worker count, including the calling thread.
    pub fn worker_threads(&mut self, val: usize) -> &mut Self {
        assert!(val > 0, "worker threads cannot be set to 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets the name of threads spawned by the scheduler.
    ///
    /// The default name is "carousel-worker-{N}".
    pub fn thread_name(&mut self, val: impl Into<String>) -> &mut Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of spawned worker threads.
    pub fn thread_name_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for spawned worker threads.
    pub fn thread_stack_size(&mut self, val: usize) -> &mut Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// Registers a hook run once on every scheduler thread (the calling
    /// thread included) before it processes any work. This is where callers
    /// acquire per-thread resources such as a local frame allocator.
    pub fn on_worker_start<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_worker_start = Some(Arc::new(f));
        self
    }

    /// Constructs the configured [`JobManager`].
    pub fn build(&mut self) -> Result<JobManager, BuildError> {
        let workers = self.worker_threads.unwrap_or_else(|| {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        });

        let shared = Arc::new(Shared::new(workers, self.on_worker_start.clone()));

        if !context::install(WorkerContext::new(MAIN_THREAD_ID, Arc::clone(&shared))) {
            return Err(BuildError::ThreadTaken);
        }
        if let Some(hook) = &shared.on_worker_start {
            hook(MAIN_THREAD_ID);
        }

        let mut threads = Vec::with_capacity(workers - 1);
        for id in 1..workers {
            let mut spawner = thread::Builder::new().name((self.thread_name.0)());
            if let Some(size) = self.thread_stack_size {
                spawner = spawner.stack_size(size);
            }

            let worker_shared = Arc::clone(&shared);
            match spawner.spawn(move || worker::worker_main(id, worker_shared)) {
                Ok(handle) => threads.push(handle),
                Err(err) => {
                    // Tear down whatever we spawned before reporting failure.
                    shared.quit.store(true, Ordering::Relaxed);
                    shared.idle.release(threads.len());
                    for handle in threads.drain(..) {
                        let _ = handle.join();
                    }
                    context::uninstall(&shared);
                    return Err(BuildError::Spawn(err));
                }
            }
        }

        tracing::debug!(workers, "job manager started");
        Ok(JobManager::from_parts(shared, threads))
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}
