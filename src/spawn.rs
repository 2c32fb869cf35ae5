use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use threadpool::ThreadPool;
use util::Latch;

use crate::job::panic_message;

/// How long a shutdown waits for in-flight flows before giving up.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(300);

/// A unit of work handed to a spawn strategy. Resolves to the failure,
/// if there was one.
pub type JobFn = Box<dyn FnOnce() -> Option<anyhow::Error> + Send>;

/// Where and how jobs run. The stock implementation is [`ThreadPoolSpawner`];
/// swap in another to run jobs on an existing executor.
pub trait SpawnStrategy: Send + Sync {
    /// Begin running `jobs`, at most `max_concurrent` at a time, in the
    /// order given. Returns one handle per job, in the same order.
    fn start(&self, cascade: &str, max_concurrent: usize, jobs: Vec<JobFn>) -> Vec<JobHandle>;

    /// True once a shutdown has been requested and no new run has started.
    fn is_shutdown(&self) -> bool;

    /// Wind down, waiting up to `timeout` for in-flight jobs to finish.
    /// Err means the deadline passed with work still running.
    fn shutdown(&self, timeout: Duration) -> Result<()>;
}

// JOB HANDLES /////////////////////////////////////////////////////////////

/// The waiting side of one submitted job.
pub struct JobHandle {
    done: Arc<Latch>,
    outcome: Arc<Mutex<Option<anyhow::Error>>>,
}

impl JobHandle {
    /// Pair `job` with a handle; running the returned closure resolves the
    /// handle. A panic escaping the job resolves the handle too, as a
    /// failure, so a joiner is never left waiting and never reads a panic
    /// as success.
    pub fn wrap(job: JobFn) -> (Self, impl FnOnce() + Send + 'static) {
        let done = Arc::new(Latch::new());
        let outcome = Arc::new(Mutex::new(None));
        let handle = Self {
            done: Arc::clone(&done),
            outcome: Arc::clone(&outcome),
        };
        let run = move || {
            let _open = SetOnDrop(done);
            let result = catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|payload| Some(anyhow!("job panicked: {}", panic_message(payload))));
            if let Some(e) = result {
                *outcome.lock().expect("job outcome lock") = Some(e);
            }
        };
        (handle, run)
    }

    /// Block until the job resolves; the failure can only be taken once.
    pub fn join(&self) -> Option<anyhow::Error> {
        self.done.wait();
        self.outcome.lock().expect("job outcome lock").take()
    }
}

struct SetOnDrop(Arc<Latch>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.set();
    }
}

// THREAD POOL /////////////////////////////////////////////////////////////

/// Runs each cascade on a fresh named thread pool sized to the run's
/// parallelism. Threads idle between runs are released when the pool is
/// replaced or shut down.
pub struct ThreadPoolSpawner {
    pool: Mutex<Option<ThreadPool>>,
    shut_down: AtomicBool,
}

impl ThreadPoolSpawner {
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }
}

impl Default for ThreadPoolSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnStrategy for ThreadPoolSpawner {
    fn start(&self, cascade: &str, max_concurrent: usize, jobs: Vec<JobFn>) -> Vec<JobHandle> {
        log::debug!(
            "cascade \"{cascade}\": starting {} jobs, max {max_concurrent} concurrent",
            jobs.len(),
        );
        let pool = ThreadPool::with_name(format!("riffle-{cascade}"), max_concurrent);
        {
            // replacing the previous run's pool lets its idle workers exit
            let mut slot = self.pool.lock().expect("spawner pool lock");
            self.shut_down.store(false, Ordering::Release);
            *slot = Some(pool.clone());
        }
        jobs.into_iter()
            .map(|job| {
                let (handle, run) = JobHandle::wrap(job);
                pool.execute(run);
                handle
            })
            .collect()
    }

    fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.shut_down.store(true, Ordering::Release);
        let Some(pool) = self.pool.lock().expect("spawner pool lock").take() else {
            return Ok(());
        };
        // join from a helper so the deadline holds even if a flow is stuck
        let done = Arc::new(Latch::new());
        let signal = Arc::clone(&done);
        thread::Builder::new()
            .name("riffle-shutdown".to_string())
            .spawn(move || {
                pool.join();
                signal.set();
            })
            .context("spawning pool shutdown thread")?;
        if done.wait_timeout(timeout) {
            Ok(())
        } else {
            bail!("thread pool did not shut down within {timeout:?}");
        }
    }
}
