use anyhow::Result;

use crate::flow::Flow;

/// Decides, just before a flow would run, whether its work can be skipped.
/// An error from the predicate fails the flow as if its run had failed.
pub trait SkipStrategy: Send + Sync {
    fn skip_flow(&self, flow: &dyn Flow) -> Result<bool>;
}

/// Skip flows whose sinks are already up to date. This is the default.
pub struct SkipStaleSinks;

impl SkipStrategy for SkipStaleSinks {
    fn skip_flow(&self, flow: &dyn Flow) -> Result<bool> {
        Ok(!flow.is_stale()?)
    }
}

/// Run every flow regardless of staleness.
pub struct NeverSkip;

impl SkipStrategy for NeverSkip {
    fn skip_flow(&self, _flow: &dyn Flow) -> Result<bool> {
        Ok(false)
    }
}

/// Skip every flow; useful for dry runs of the scheduling itself.
pub struct AlwaysSkip;

impl SkipStrategy for AlwaysSkip {
    fn skip_flow(&self, _flow: &dyn Flow) -> Result<bool> {
        Ok(true)
    }
}
