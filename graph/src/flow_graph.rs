use util::{HashSet, IdVec};

use crate::{topo, Error, FlowId, TapGraph};

/// Flows as nodes; an edge from U to V means V reads a tap that U writes
/// (checkpoints included), so U must finish before V may start.
#[derive(Debug)]
pub struct FlowGraph {
    succs: IdVec<FlowId, Vec<FlowId>>,
    preds: IdVec<FlowId, Vec<FlowId>>,
    topo: Vec<FlowId>,
}

impl FlowGraph {
    /// Derive dependency edges from a finished [`TapGraph`] and check that the
    /// result is acyclic. Edges are discovered in tap insertion order and ties
    /// are broken by flow insertion order, so the topological order is the
    /// same on every run.
    pub fn derive(taps: &TapGraph) -> Result<Self, Error> {
        let n = taps.num_flows();
        let mut succs: IdVec<FlowId, Vec<FlowId>> = IdVec::fill(Vec::new(), n);
        let mut preds: IdVec<FlowId, Vec<FlowId>> = IdVec::fill(Vec::new(), n);
        let mut seen: HashSet<(FlowId, FlowId)> = HashSet::default();

        for tap in taps.taps() {
            for &writer in &tap.writers {
                for &reader in &tap.readers {
                    if writer == reader {
                        return Err(Error::SelfDependency(taps.flow_name(writer).to_owned()));
                    }
                    if seen.insert((writer, reader)) {
                        succs.get_mut(writer).push(reader);
                        preds.get_mut(reader).push(writer);
                    }
                }
            }
        }

        let topo = topo::sort(&succs, &preds).map_err(|stuck| {
            Error::DependencyCycle(
                stuck
                    .iter()
                    .map(|id| taps.flow_name(*id).to_owned())
                    .collect(),
            )
        })?;

        log::debug!("flow graph: {} flows, {} dependency edges", n, seen.len());
        Ok(Self { succs, preds, topo })
    }

    /// All flows, in execution order.
    #[inline]
    pub fn topo_order(&self) -> &[FlowId] {
        &self.topo
    }

    /// Flows that must finish before `flow` may start.
    #[inline]
    pub fn predecessors(&self, flow: FlowId) -> &[FlowId] {
        self.preds.get(flow)
    }

    /// Flows that read what `flow` writes.
    #[inline]
    pub fn successors(&self, flow: FlowId) -> &[FlowId] {
        self.succs.get(flow)
    }

    /// Flows with no predecessors, in execution order.
    pub fn heads(&self) -> Vec<FlowId> {
        self.topo
            .iter()
            .copied()
            .filter(|f| self.preds.get(*f).is_empty())
            .collect()
    }

    /// Flows with no successors, in execution order.
    pub fn tails(&self) -> Vec<FlowId> {
        self.topo
            .iter()
            .copied()
            .filter(|f| self.succs.get(*f).is_empty())
            .collect()
    }

    /// Flows with both predecessors and successors, in execution order.
    pub fn intermediates(&self) -> Vec<FlowId> {
        self.topo
            .iter()
            .copied()
            .filter(|f| !self.preds.get(*f).is_empty() && !self.succs.get(*f).is_empty())
            .collect()
    }
}
