use std::sync::Arc;

use anyhow::Result;

use crate::listener::CascadeListener;

/// A single unit of work in a cascade: a sub-pipeline that reads durable
/// source taps and writes durable sink taps.
///
/// Tap identifiers are opaque strings; the cascade connects two flows exactly
/// when one's sink identifier equals the other's source identifier, so flows
/// that should hand data to each other must agree on fully-qualified names.
///
/// A flow is moved into the cascade that runs it ([`crate::CascadeBuilder::add_flow`]
/// takes it by value), so one flow instance can never be shared between
/// cascades.
pub trait Flow: Send + Sync {
    /// Name of this flow, unique within a cascade.
    fn name(&self) -> &str;

    /// Identifiers of the taps this flow reads.
    fn source_taps(&self) -> Vec<String>;

    /// Identifiers of the taps this flow writes.
    fn sink_taps(&self) -> Vec<String>;

    /// Identifiers of intermediate results this flow persists. Checkpoints
    /// count as written taps: downstream flows may read them, and no other
    /// flow may write them.
    fn checkpoint_taps(&self) -> Vec<String> {
        Vec::new()
    }

    /// True if this flow's sinks are missing or out of date relative to its
    /// sources. The default skip policy runs only stale flows; defaulting to
    /// stale means a flow that cannot tell always runs.
    fn is_stale(&self) -> Result<bool> {
        Ok(true)
    }

    /// Called before [`Self::run_to_completion`], on the same worker.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Execute the flow's work, blocking until it has finished.
    fn run_to_completion(&self) -> Result<()>;

    /// Called after the run on the same worker, whether or not the run
    /// succeeded. A cleanup failure after a successful run fails the flow;
    /// after an unsuccessful run it is only logged.
    fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    /// Ask the flow to stop: cooperative and best-effort. May be called from
    /// another thread before, during, or after the run, and must not block.
    fn stop(&self) {}

    /// True if this flow executes entirely inside the calling process. When a
    /// cascade holds more than one such flow they are run one at a time
    /// unless the caller sets an explicit concurrency cap.
    fn runs_in_process(&self) -> bool {
        false
    }

    /// True if this flow wants the cascade stopped when the process is
    /// interrupted.
    fn stop_on_exit(&self) -> bool {
        true
    }

    /// Listeners carried by this flow's endpoints. They are registered on the
    /// cascade automatically when the flow is added.
    fn endpoint_listeners(&self) -> Vec<Arc<dyn CascadeListener>> {
        Vec::new()
    }
}
