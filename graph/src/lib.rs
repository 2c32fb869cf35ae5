//!
//! Graph structures connecting data-pipeline flows through the taps they read and write.
//!
//! A flow is a unit of work that reads from source taps and writes to sink taps;
//! taps are opaque identifier strings, and two flows are connected exactly when
//! one writes a tap the other reads. This crate builds both views of a cascade:
//! the [`TapGraph`] (taps as nodes, flows as labeled edges) and the [`FlowGraph`]
//! (flows as nodes, derived dependency edges, in topological order).
//!
//! Structural problems are all caught while building: a flow name used twice,
//! a tap written by two flows, or a dependency cycle each fail with an [`Error`]
//! before anything can run.

/// typed ids for flows and taps
mod id;
pub use id::{FlowId, TapId};

/// taps as nodes, flows as labeled edges
mod tap_graph;
pub use tap_graph::{FlowTaps, TapGraph};

/// flows as nodes, dependency edges, topological order
mod flow_graph;
pub use flow_graph::FlowGraph;

mod topo;

mod dot;
pub use dot::write_dot;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("duplicate flow name \"{0}\"; flow names must be unique within a cascade")]
    DuplicateFlowName(String),
    #[error(
        "tap \"{tap}\" is written by both \"{existing}\" and \"{adding}\"; \
        each tap may have at most one writer"
    )]
    DuplicateSink {
        tap: String,
        existing: String,
        adding: String,
    },
    #[error("flow \"{0}\" reads one of its own sinks")]
    SelfDependency(String),
    #[error("dependency cycle among flows: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}
