use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use util::Latch;

use crate::error::CascadeError;
use crate::flow::Flow;
use crate::skip::SkipStrategy;
use crate::stats::{CascadeStats, FlowStats};

/// One scheduled run of one flow.
///
/// Jobs are built fresh for every run and wired to the jobs of their
/// predecessor flows; a job waits on those before doing anything. The done
/// latch opens on every exit path, so a waiting successor can never be left
/// hanging, and `succeeded` reads the outcome flags only after the latch
/// opens, which makes the flags safe to read without further locking.
pub(crate) struct Job {
    flow: Arc<dyn Flow>,
    stats: Arc<FlowStats>,
    predecessors: OnceLock<Vec<Arc<Job>>>,
    done: Latch,
    stopped: AtomicBool,
    failed: AtomicBool,
}

impl Job {
    pub(crate) fn new(flow: Arc<dyn Flow>, stats: Arc<FlowStats>) -> Self {
        Self {
            flow,
            stats,
            predecessors: OnceLock::new(),
            done: Latch::new(),
            stopped: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    /// Wire in predecessor jobs. Called once, after all jobs for the run
    /// exist and before any of them is submitted.
    pub(crate) fn link_predecessors(&self, predecessors: Vec<Arc<Job>>) {
        if self.predecessors.set(predecessors).is_err() {
            log::warn!(
                "flow \"{}\": predecessors linked twice, keeping the first set",
                self.flow.name()
            );
        }
    }

    #[inline]
    pub(crate) fn flow_name(&self) -> &str {
        self.flow.name()
    }

    /// Run the flow, honoring predecessor outcomes, stop requests, and the
    /// skip policy. Returns the failure if this flow is the one that failed;
    /// aborted and skipped runs return `None`.
    pub(crate) fn execute(
        &self,
        cascade: &CascadeStats,
        skip: &dyn SkipStrategy,
    ) -> Option<anyhow::Error> {
        // opens the done latch on every path out of this fn, panics included
        let _open = OpenOnDrop(&self.done);
        let name = self.flow.name();

        for predecessor in self.predecessors.get().into_iter().flatten() {
            if !predecessor.succeeded() {
                log::debug!(
                    "flow \"{name}\": upstream flow \"{}\" did not succeed, not running",
                    predecessor.flow_name(),
                );
                self.abort();
                return None;
            }
        }

        if self.stopped.load(Ordering::Acquire) || cascade.is_finished() {
            log::debug!("flow \"{name}\": cascade is winding down, not running");
            self.abort();
            return None;
        }

        // the skip consult runs flow code too, so it gets the same guard as
        // the run itself; the failure flag must be set before the latch opens
        match self.guarded(name, || skip.skip_flow(self.flow.as_ref())) {
            Ok(true) => {
                log::info!("flow \"{name}\": sinks are up to date, skipping");
                self.stats.mark_skipped();
                return None;
            }
            Ok(false) => {}
            Err(e) => return Some(self.fail(e.context("while checking whether flow can be skipped"))),
        }

        self.stats.mark_running();
        match self.run_flow() {
            Ok(()) => {
                self.stats.mark_successful();
                None
            }
            Err(e) => Some(self.fail(e)),
        }
    }

    /// Prepare and run the flow, then clean up no matter how that went.
    fn run_flow(&self) -> Result<()> {
        let name = self.flow.name();
        let body = self.guarded(name, || {
            self.flow.prepare()?;
            self.flow.run_to_completion()
        });
        let cleanup = self.guarded(name, || self.flow.cleanup());

        match (body, cleanup) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(cleanup_err)) => Err(cleanup_err.context("while cleaning up flow")),
            (Err(body_err), Ok(())) => Err(body_err),
            (Err(body_err), Err(cleanup_err)) => {
                log::warn!("flow \"{name}\": cleanup also failed: {cleanup_err:#}");
                Err(body_err)
            }
        }
    }

    // flow code is outside our control; a panic in it becomes a plain error
    fn guarded<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => Err(CascadeError::FlowPanic {
                flow: name.to_owned(),
                msg: panic_message(payload),
            }
            .into()),
        }
    }

    fn fail(&self, e: anyhow::Error) -> anyhow::Error {
        self.failed.store(true, Ordering::Release);
        self.stats.mark_failed();
        e.context(CascadeError::FlowFailed(self.flow.name().to_owned()))
    }

    /// Block until this job resolves, then report whether downstream flows
    /// may run. Skipped flows count as succeeded.
    pub(crate) fn succeeded(&self) -> bool {
        self.done.wait();
        !self.failed.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire)
    }

    /// Ask this job to stand down. Idempotent; forwards the request to the
    /// flow, which may already be running.
    pub(crate) fn stop(&self) {
        // record the state first: an abort may have set the flag without
        // touching stats, and mark_stopped is a no-op once finished
        self.stats.mark_stopped();
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("flow \"{}\": stop requested", self.flow.name());
        self.flow.stop();
    }

    // quiet refusal to run; the flow never started, so there is nothing to interrupt
    fn abort(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

struct OpenOnDrop<'a>(&'a Latch);

impl Drop for OpenOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set();
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
