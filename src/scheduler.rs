//! Drives one run of a cascade's flows.

use std::sync::Arc;

use anyhow::Result;
use graph::FlowId;
use util::IdVec;

use crate::cascade::CascadeCore;
use crate::job::Job;
use crate::spawn::{JobFn, SHUTDOWN_TIMEOUT};

/// Run every flow in dependency order and report the first failure.
///
/// Handles are awaited in topological order rather than completion order, so
/// the failure reported for a run is always the one earliest in dependency
/// order, no matter how the spawn strategy interleaved execution.
pub(crate) fn run(core: &CascadeCore) -> Result<()> {
    let topo = core.graph.topo_order();
    if topo.is_empty() {
        log::info!("cascade \"{}\": no flows to run", core.name);
        core.stats.mark_successful();
        return Ok(());
    }

    let in_process = core.flows.iter().filter(|f| f.runs_in_process()).count();
    if core.max_concurrent == 0 && in_process > 1 {
        log::info!(
            "cascade \"{}\": {in_process} flows run in-process, limiting to one at a time",
            core.name,
        );
    }
    let max_concurrent = effective_parallelism(core.max_concurrent, in_process, topo.len());
    log::info!(
        "cascade \"{}\": running {} flows, max {max_concurrent} concurrent",
        core.name,
        topo.len(),
    );

    let jobs = build_jobs(core);
    let ordered: Vec<Arc<Job>> = topo.iter().map(|&id| Arc::clone(jobs.get(id))).collect();
    core.set_jobs(ordered.clone());

    let cascade_stats = Arc::clone(&core.stats);
    let skip = core.skip_strategy();
    let job_fns: Vec<JobFn> = ordered
        .iter()
        .map(|job| {
            let job = Arc::clone(job);
            let stats = Arc::clone(&cascade_stats);
            let skip = Arc::clone(&skip);
            Box::new(move || job.execute(&stats, skip.as_ref())) as JobFn
        })
        .collect();
    let handles = core.spawner.start(&core.name, max_concurrent, job_fns);

    let mut failure = None;
    for (handle, job) in handles.iter().zip(&ordered) {
        let Some(err) = handle.join() else {
            continue;
        };
        if core.is_stopping() {
            // the run is already coming down; the stop outcome stands
            log::debug!(
                "cascade \"{}\": flow \"{}\" failed during stop: {err:#}",
                core.name,
                job.flow_name(),
            );
            continue;
        }
        log::warn!(
            "cascade \"{}\": flow \"{}\" failed, stopping remaining flows",
            core.name,
            job.flow_name(),
        );
        core.stats.mark_failed();
        core.stop_jobs();
        if core.listeners.fire_throwable(&core.name, &err) {
            core.stop();
        }
        if let Err(e) = core.spawner.shutdown(SHUTDOWN_TIMEOUT) {
            log::warn!("cascade \"{}\": {e:#}", core.name);
        }
        failure = Some(err);
        break;
    }

    match failure {
        Some(err) => Err(err),
        None => {
            // all jobs have resolved, so this releases an idle pool
            if let Err(e) = core.spawner.shutdown(SHUTDOWN_TIMEOUT) {
                log::warn!("cascade \"{}\": {e:#}", core.name);
            }
            // a no-op when the run was stopped out from under us
            core.stats.mark_successful();
            Ok(())
        }
    }
}

/// Build this run's jobs, indexed by flow id, with predecessors wired in
/// from the dependency graph.
fn build_jobs(core: &CascadeCore) -> IdVec<FlowId, Arc<Job>> {
    let mut jobs = IdVec::with_capacity(core.flows.len());
    for (id, flow) in core.flows.entries() {
        let stats = Arc::clone(core.flow_stats.get(id));
        jobs.push(Arc::new(Job::new(Arc::clone(flow), stats)));
    }
    for (id, job) in jobs.entries() {
        let predecessors = core
            .graph
            .predecessors(id)
            .iter()
            .map(|&p| Arc::clone(jobs.get(p)))
            .collect();
        job.link_predecessors(predecessors);
    }
    jobs
}

/// A user-supplied cap wins outright; otherwise more than one in-process
/// flow forces serial execution, and the default is one slot per flow.
fn effective_parallelism(user_cap: usize, in_process: usize, num_flows: usize) -> usize {
    if user_cap > 0 {
        user_cap
    } else if in_process > 1 {
        1
    } else {
        num_flows
    }
}
