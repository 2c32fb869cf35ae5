use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use graph::{FlowGraph, FlowId, TapGraph};
use util::{IdVec, Timer};

use crate::error::CascadeError;
use crate::exit;
use crate::flow::Flow;
use crate::job::{panic_message, Job};
use crate::listener::{CascadeListener, Listeners};
use crate::scheduler;
use crate::skip::SkipStrategy;
use crate::spawn::{SpawnStrategy, SHUTDOWN_TIMEOUT};
use crate::stats::{CascadeState, CascadeStats, FlowState, FlowStats};

/// State shared between the public [`Cascade`], the run thread, and the
/// process-exit hook.
pub(crate) struct CascadeCore {
    pub(crate) name: String,
    pub(crate) flows: IdVec<FlowId, Arc<dyn Flow>>,
    pub(crate) flow_stats: IdVec<FlowId, Arc<FlowStats>>,
    pub(crate) taps: TapGraph,
    pub(crate) graph: FlowGraph,
    pub(crate) stats: Arc<CascadeStats>,
    pub(crate) listeners: Listeners,
    pub(crate) spawner: Arc<dyn SpawnStrategy>,
    pub(crate) max_concurrent: usize,
    skip: Mutex<Arc<dyn SkipStrategy>>,
    error: Mutex<Option<anyhow::Error>>,
    jobs: Mutex<Vec<Arc<Job>>>,
    stopping: AtomicBool,
}

impl CascadeCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        flows: IdVec<FlowId, Arc<dyn Flow>>,
        taps: TapGraph,
        graph: FlowGraph,
        listeners: Vec<Arc<dyn CascadeListener>>,
        skip: Arc<dyn SkipStrategy>,
        spawner: Arc<dyn SpawnStrategy>,
        max_concurrent: usize,
    ) -> Self {
        let mut flow_stats = IdVec::with_capacity(flows.len());
        for flow in flows.iter() {
            flow_stats.push(Arc::new(FlowStats::new(flow.name())));
        }
        Self {
            stats: Arc::new(CascadeStats::new(&name)),
            name,
            flows,
            flow_stats,
            taps,
            graph,
            listeners: Listeners::new(listeners),
            spawner,
            max_concurrent,
            skip: Mutex::new(skip),
            error: Mutex::new(None),
            jobs: Mutex::new(Vec::new()),
            stopping: AtomicBool::new(false),
        }
    }

    // RUNNING /////////////////////////////////////////////////////////////

    /// The whole life of one run, executed on the background thread. Never
    /// raises: failures land in the captured-error slot for `complete()`.
    pub(crate) fn run_to_end(self: &Arc<Self>) {
        log::info!(
            "riffle {} running cascade \"{}\"",
            env!("CARGO_PKG_VERSION"),
            self.name,
        );
        let timer = Timer::now();
        let hooked = self.flows.iter().any(|f| f.stop_on_exit());
        if hooked {
            exit::register(Arc::downgrade(self));
        }

        self.stats.mark_running();
        if self.listeners.fire_starting(&self.name) {
            self.stop();
        }

        let result = catch_unwind(AssertUnwindSafe(|| scheduler::run(self)))
            .unwrap_or_else(|payload| Err(CascadeError::RunPanic(panic_message(payload)).into()));
        if let Err(e) = result {
            log::debug!("cascade \"{}\": failed: {e:#}", self.name);
            // usually the scheduler already did this; panics have not
            self.stats.mark_failed();
            self.capture(e);
        }

        if self.listeners.fire_completed(&self.name) {
            self.stop();
        }
        if hooked {
            exit::deregister(self);
        }
        timer.log_elapsed(&format!("cascade \"{}\"", self.name));
    }

    fn capture(&self, e: anyhow::Error) {
        let mut slot = self.error.lock().expect("captured error lock");
        if slot.is_none() {
            *slot = Some(e);
        } else {
            log::debug!("cascade \"{}\": later failure not recorded: {e:#}", self.name);
        }
    }

    fn take_error(&self) -> Option<anyhow::Error> {
        self.error.lock().expect("captured error lock").take()
    }

    pub(crate) fn skip_strategy(&self) -> Arc<dyn SkipStrategy> {
        Arc::clone(&self.skip.lock().expect("skip strategy lock"))
    }

    // STOPPING ////////////////////////////////////////////////////////////

    #[inline]
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Wind the run down: notify listeners, record the state, stop jobs
    /// tail-first, then wait (bounded) for in-flight flows.
    pub(crate) fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("cascade \"{}\": stopping", self.name);
        self.listeners.fire_stopping(&self.name);
        self.stats.mark_stopped();
        self.stop_jobs();
        if let Err(e) = self.spawner.shutdown(SHUTDOWN_TIMEOUT) {
            // a slow shutdown does not change the run's outcome
            log::warn!("cascade \"{}\": {e:#}", self.name);
        }
        self.clear_jobs();
    }

    /// Stop this run's jobs in reverse topological order, so a downstream
    /// flow stops before its upstream can hand it anything new.
    pub(crate) fn stop_jobs(&self) {
        let jobs = self.jobs.lock().expect("job table lock");
        for job in jobs.iter().rev() {
            job.stop();
        }
    }

    pub(crate) fn set_jobs(&self, jobs: Vec<Arc<Job>>) {
        *self.jobs.lock().expect("job table lock") = jobs;
    }

    pub(crate) fn clear_jobs(&self) {
        self.jobs.lock().expect("job table lock").clear();
    }
}

// PUBLIC SURFACE //////////////////////////////////////////////////////////

/// A group of flows executed as one unit, in the order their shared taps
/// imply. Built with a [`crate::CascadeBuilder`].
pub struct Cascade {
    core: Arc<CascadeCore>,
    started: AtomicBool,
    run_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Cascade {
    pub(crate) fn new(core: CascadeCore) -> Self {
        Self {
            core: Arc::new(core),
            started: AtomicBool::new(false),
            run_thread: Mutex::new(None),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    #[inline]
    pub fn state(&self) -> CascadeState {
        self.core.stats.state()
    }

    /// Current state of the named flow, if it belongs to this cascade.
    pub fn flow_state(&self, flow: &str) -> Option<FlowState> {
        self.core
            .taps
            .flow_id(flow)
            .map(|id| self.core.flow_stats.get(id).state())
    }

    /// Begin running on a background thread. Does not block; calling it
    /// again has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name(format!("riffle-run-{}", self.core.name))
            .spawn(move || core.run_to_end());
        match spawned {
            Ok(handle) => *self.run_thread.lock().expect("run thread lock") = Some(handle),
            Err(e) => {
                // start() never raises; the failure surfaces from complete()
                self.core.stats.mark_failed();
                self.core
                    .capture(anyhow::Error::new(e).context("spawning cascade run thread"));
            }
        }
    }

    /// Run to completion, blocking, and report the outcome. The first
    /// failure is re-raised with the failing flow named in its context;
    /// both the [`CascadeError`] and the flow's own error stay
    /// downcastable.
    pub fn complete(&self) -> Result<()> {
        self.start();
        let thread = self.run_thread.lock().expect("run thread lock").take();
        let mut panicked = None;
        if let Some(handle) = thread {
            if let Err(payload) = handle.join() {
                panicked = Some(CascadeError::RunPanic(panic_message(payload)));
            }
        }
        let outcome = match self.core.take_error() {
            Some(e) => Err(e),
            None => match panicked {
                Some(p) => Err(p.into()),
                None => Ok(()),
            },
        };
        self.core.clear_jobs();
        outcome
    }

    /// Stop the run. Idempotent; blocks while in-flight flows wind down,
    /// bounded by the shutdown timeout.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn add_listener(&self, listener: Arc<dyn CascadeListener>) {
        self.core.listeners.add(listener);
    }

    /// Remove a previously added listener; identity is the caller's
    /// original reference. False if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn CascadeListener>) -> bool {
        self.core.listeners.remove(listener)
    }

    /// Override every flow's own staleness policy for this cascade.
    pub fn set_skip_strategy(&self, strategy: impl SkipStrategy + 'static) {
        *self.core.skip.lock().expect("skip strategy lock") = Arc::new(strategy);
    }

    // QUERIES /////////////////////////////////////////////////////////////

    /// All flows, in an order consistent with their dependencies.
    pub fn flows(&self) -> Vec<&dyn Flow> {
        self.by_id(self.core.graph.topo_order())
    }

    /// Flows no other flow in this cascade feeds.
    pub fn head_flows(&self) -> Vec<&dyn Flow> {
        self.by_id(&self.core.graph.heads())
    }

    /// Flows that feed no other flow in this cascade.
    pub fn tail_flows(&self) -> Vec<&dyn Flow> {
        self.by_id(&self.core.graph.tails())
    }

    pub fn intermediate_flows(&self) -> Vec<&dyn Flow> {
        self.by_id(&self.core.graph.intermediates())
    }

    /// Flows whose sources include `tap`.
    pub fn flows_reading(&self, tap: &str) -> Vec<&dyn Flow> {
        self.by_id(self.core.taps.flows_reading(tap))
    }

    /// Flows whose sinks or checkpoints include `tap`.
    pub fn flows_writing(&self, tap: &str) -> Vec<&dyn Flow> {
        self.by_id(self.core.taps.flows_writing(tap))
    }

    /// Direct upstream flows of the named flow; empty if unknown.
    pub fn predecessors(&self, flow: &str) -> Vec<&dyn Flow> {
        match self.core.taps.flow_id(flow) {
            Some(id) => self.by_id(self.core.graph.predecessors(id)),
            None => Vec::new(),
        }
    }

    /// Direct downstream flows of the named flow; empty if unknown.
    pub fn successors(&self, flow: &str) -> Vec<&dyn Flow> {
        match self.core.taps.flow_id(flow) {
            Some(id) => self.by_id(self.core.graph.successors(id)),
            None => Vec::new(),
        }
    }

    pub fn source_taps(&self) -> Vec<&str> {
        self.core.taps.source_taps()
    }

    pub fn sink_taps(&self) -> Vec<&str> {
        self.core.taps.sink_taps()
    }

    pub fn checkpoint_taps(&self) -> Vec<&str> {
        self.core.taps.checkpoint_taps()
    }

    pub fn intermediate_taps(&self) -> Vec<&str> {
        self.core.taps.intermediate_taps()
    }

    /// Render the tap graph in DOT format for inspection.
    pub fn write_dot<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        graph::write_dot(&self.core.taps, w)
    }

    fn by_id(&self, ids: &[FlowId]) -> Vec<&dyn Flow> {
        ids.iter()
            .map(|&id| self.core.flows.get(id).as_ref())
            .collect()
    }
}
