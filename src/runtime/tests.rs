use crate::runtime::{BuildError, JobManager};
use crate::task::{spawn, spawn_main, JobList};
use crate::thread_id;
use anyhow::Result;
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Brackets a running session, closing it on drop so a failing assertion
/// inside a test cannot leave the manager running when it is torn down.
struct Session<'a>(&'a JobManager);

impl<'a> Session<'a> {
    fn start(manager: &'a JobManager) -> Session<'a> {
        manager.prepare_to_run_jobs();
        Session(manager)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.0.stop_running_jobs();
    }
}

fn manager(workers: usize) -> Result<JobManager> {
    Ok(JobManager::builder().worker_threads(workers).build()?)
}

#[test]
fn basic_job_execution() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let counter = Arc::new(AtomicUsize::new(0));
    let mut jobs = JobList::new(&manager);
    {
        let counter = Arc::clone(&counter);
        jobs.push_job(async move {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    jobs.wait_for_completion();

    assert_eq!(counter.load(Ordering::Relaxed), 1);
    Ok(())
}

#[test]
fn return_value_is_readable_after_wait() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    jobs.push_job(async { 42 });
    jobs.wait_for_completion();

    assert_eq!(jobs[0], 42);
    Ok(())
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn multiple_jobs_all_complete(#[case] workers: usize) -> Result<()> {
    let manager = manager(workers)?;
    let _session = Session::start(&manager);

    let counter = Arc::new(AtomicUsize::new(0));
    let mut jobs = JobList::new(&manager);
    for _ in 0..10 {
        let counter = Arc::clone(&counter);
        jobs.push_job(async move {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    jobs.wait_for_completion();

    assert_eq!(counter.load(Ordering::Relaxed), 10);
    Ok(())
}

#[test]
fn concurrent_job_execution() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let counter = Arc::new(AtomicUsize::new(0));
    let mut jobs = JobList::new(&manager);
    for _ in 0..1000 {
        let counter = Arc::clone(&counter);
        jobs.push_job(async move {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    jobs.wait_for_completion();

    assert_eq!(counter.load(Ordering::Relaxed), 1000);
    Ok(())
}

#[test]
fn main_thread_job_runs_on_thread_zero() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    jobs.push_main_thread_job(async { thread_id() });
    jobs.wait_for_completion();

    assert_eq!(jobs[0], 0);
    Ok(())
}

#[test]
fn main_thread_affinity_survives_awaits() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    jobs.push_main_thread_job(async {
        let before = thread_id();
        let child = spawn(async { 7 });
        let value = child.await;
        // Resumed after the await, still pinned to thread 0.
        (before, thread_id(), value)
    });
    jobs.wait_for_completion();

    assert_eq!(jobs[0], (0, 0, 7));
    Ok(())
}

#[test]
fn empty_job_list_wait_returns_immediately() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let mut jobs: JobList<()> = JobList::new(&manager);
    jobs.wait_for_completion();
    jobs.wait_for_completion(); // idempotent

    assert!(jobs.is_empty());
    Ok(())
}

#[test]
fn job_throughput_hundred_thousand() -> Result<()> {
    const NUM_JOBS: usize = 100_000;

    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let counter = Arc::new(AtomicUsize::new(0));
    let mut jobs = JobList::new(&manager);
    for _ in 0..NUM_JOBS {
        let counter = Arc::clone(&counter);
        jobs.push_job(async move {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    jobs.wait_for_completion();

    assert_eq!(counter.load(Ordering::Relaxed), NUM_JOBS);
    assert_eq!(jobs.len(), NUM_JOBS);
    Ok(())
}

#[test]
fn nested_await_chain_with_main_thread_hop() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    jobs.push_job(async {
        let child = spawn(async { 42 });
        let value = child.await;

        let on_main = spawn_main(async { thread_id() });
        assert_eq!(on_main.await, 0);

        value
    });
    jobs.wait_for_completion();

    assert_eq!(jobs[0], 42);
    Ok(())
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn value_jobs_survive_cross_thread_completion(#[case] workers: usize) -> Result<()> {
    const NUM_JOBS: usize = 64;

    let manager = manager(workers)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    for i in 0..NUM_JOBS {
        jobs.push_job(async move { i * 2 });
    }
    jobs.wait_for_completion();

    for i in 0..NUM_JOBS {
        assert_eq!(jobs[i], i * 2);
    }
    Ok(())
}

#[test]
fn jobs_spawning_jobs_from_many_threads() -> Result<()> {
    const PARENTS: usize = 8;
    const CHILDREN: usize = 100;

    let manager = manager(4)?;
    let _session = Session::start(&manager);

    let counter = Arc::new(AtomicUsize::new(0));
    let mut jobs = JobList::new(&manager);
    for _ in 0..PARENTS {
        let counter = Arc::clone(&counter);
        jobs.push_job(async move {
            for _ in 0..CHILDREN {
                let counter = Arc::clone(&counter);
                let child = spawn(async move {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
                child.await;
            }
        });
    }
    jobs.wait_for_completion();

    assert_eq!(counter.load(Ordering::Relaxed), PARENTS * CHILDREN);
    Ok(())
}

#[test]
fn single_worker_runs_everything_inline() -> Result<()> {
    let manager = manager(1)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    jobs.push_job(async {
        let child = spawn(async { thread_id() });
        child.await
    });
    jobs.wait_for_completion();

    assert_eq!(jobs[0], 0);
    Ok(())
}

#[test]
fn sequential_batches_reuse_the_pool() -> Result<()> {
    let manager = manager(2)?;

    for round in 0..3 {
        let _session = Session::start(&manager);

        let mut jobs = JobList::new(&manager);
        jobs.push_job(async move { round });
        jobs.wait_for_completion();
        assert_eq!(jobs[0], round);
    }
    Ok(())
}

#[test]
fn worker_start_hook_runs_on_every_thread() -> Result<()> {
    const WORKERS: usize = 4;

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let manager = {
        let seen = Arc::clone(&seen);
        JobManager::builder()
            .worker_threads(WORKERS)
            .thread_name_fn(|| "pool-worker".to_string())
            .on_worker_start(move |id| {
                let name = thread::current().name().map(str::to_owned);
                seen.lock().push((id, name));
            })
            .build()?
    };

    // Spawned workers run their hook asynchronously at thread start.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while seen.lock().len() < WORKERS {
        assert!(
            std::time::Instant::now() < deadline,
            "worker start hooks never ran"
        );
        thread::sleep(Duration::from_millis(1));
    }

    let mut hooks = seen.lock().clone();
    hooks.sort();
    let ids: Vec<usize> = hooks.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, (0..WORKERS).collect::<Vec<_>>());

    // Thread 0 is the building thread; the spawned workers carry the
    // configured name.
    for (id, name) in &hooks[1..] {
        assert_eq!(name.as_deref(), Some("pool-worker"), "worker {id}");
    }

    drop(manager);
    Ok(())
}

#[test]
fn thread_id_outside_the_scheduler_panics() -> Result<()> {
    let _manager = manager(2)?;

    let result = thread::spawn(|| thread_id()).join();
    assert!(result.is_err());
    Ok(())
}

#[test]
fn handle_reports_finished_after_wait() -> Result<()> {
    let manager = manager(2)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    jobs.push_job(async {
        let mut child = spawn(async { 5 });
        assert_eq!((&mut child).await, 5);
        assert!(child.is_finished());
    });
    jobs.wait_for_completion();
    Ok(())
}

#[test]
fn awaiting_two_children_through_a_join_combinator() -> Result<()> {
    let manager = manager(4)?;
    let _session = Session::start(&manager);

    // Polling two handles at once leaves a registration on the slower child
    // outstanding each time the faster one's suspension re-polls the parent.
    let mut jobs = JobList::new(&manager);
    jobs.push_job(async {
        let quick = spawn(async {
            let inner = spawn(async {
                thread::sleep(Duration::from_millis(10));
                1
            });
            inner.await
        });
        let slow = spawn(async {
            let inner = spawn(async {
                thread::sleep(Duration::from_millis(100));
                2
            });
            inner.await
        });

        let (a, b) = futures::future::join(quick, slow).await;
        a + b
    });
    jobs.wait_for_completion();

    assert_eq!(jobs[0], 3);
    Ok(())
}

#[test]
fn failed_build_tears_down_and_frees_the_thread() -> Result<()> {
    // A stack size no mapping can satisfy makes the first worker spawn fail.
    let result = JobManager::builder()
        .worker_threads(2)
        .thread_stack_size(usize::MAX / 2)
        .build();
    assert!(matches!(result, Err(BuildError::Spawn(_))));

    // The failure left no state behind; the same thread can build a pool.
    let manager = manager(2)?;
    let _session = Session::start(&manager);

    let mut jobs = JobList::new(&manager);
    jobs.push_job(async { 1 });
    jobs.wait_for_completion();
    assert_eq!(jobs[0], 1);
    Ok(())
}

#[test]
fn manager_can_be_rebuilt_after_drop() -> Result<()> {
    let first = manager(2)?;
    drop(first);

    let second = manager(2)?;
    let _session = Session::start(&second);

    let mut jobs = JobList::new(&second);
    jobs.push_job(async { 2 });
    jobs.wait_for_completion();
    assert_eq!(jobs[0], 2);
    Ok(())
}

#[test]
#[should_panic(expected = "job list dropped before wait_for_completion")]
fn dropping_an_unwaited_list_is_fatal() {
    // Single worker: the push resumes inline, so no session or worker
    // teardown interferes with the panic under test.
    let manager = JobManager::builder().worker_threads(1).build().unwrap();

    let mut jobs = JobList::new(&manager);
    jobs.push_job(async {});
    drop(jobs);
}

#[test]
#[should_panic(expected = "job pushed into a job list that was already waited on")]
fn pushing_after_wait_is_fatal() {
    let manager = JobManager::builder().worker_threads(1).build().unwrap();

    let mut jobs = JobList::new(&manager);
    jobs.push_job(async {});
    jobs.wait_for_completion();
    jobs.push_job(async {});
}
