use std::sync::Arc;

use anyhow::Result;
use graph::{FlowGraph, FlowId, FlowTaps, TapGraph};
use util::IdVec;

use crate::cascade::{Cascade, CascadeCore};
use crate::flow::Flow;
use crate::listener::CascadeListener;
use crate::skip::SkipStaleSinks;
use crate::spawn::{SpawnStrategy, ThreadPoolSpawner};

/// Assembles a [`Cascade`] from flows, validating as it goes.
///
/// Flows are moved in; the cascade owns them for the rest of their lives.
/// Structural errors (a reused flow name, a tap with two writers, a
/// dependency cycle) surface from [`build`](Self::build) as
/// [`ConfigurationError`](crate::ConfigurationError) values, reported
/// against the later-added of the offending flows.
pub struct CascadeBuilder {
    name: Option<String>,
    flows: Vec<Box<dyn Flow>>,
    max_concurrent: usize,
    spawner: Option<Arc<dyn SpawnStrategy>>,
}

impl CascadeBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            flows: Vec::new(),
            max_concurrent: 0,
            spawner: None,
        }
    }

    /// Name the cascade; otherwise flow names are joined with `+`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Cap on concurrently running flows. Zero (the default) means bounded
    /// only by the dependency structure.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Run jobs somewhere other than the default per-run thread pool.
    pub fn spawn_strategy(mut self, spawner: impl SpawnStrategy + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    pub fn add_flow(mut self, flow: Box<dyn Flow>) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn flows(mut self, flows: impl IntoIterator<Item = Box<dyn Flow>>) -> Self {
        self.flows.extend(flows);
        self
    }

    /// Validate the flows, build both graphs, and produce the cascade.
    pub fn build(self) -> Result<Cascade> {
        let mut taps = TapGraph::default();
        let mut flows: IdVec<FlowId, Arc<dyn Flow>> = IdVec::with_capacity(self.flows.len());
        let mut listeners: Vec<Arc<dyn CascadeListener>> = Vec::new();

        for flow in self.flows {
            let flow: Arc<dyn Flow> = Arc::from(flow);
            let id = taps.add_flow(FlowTaps {
                name: flow.name().to_owned(),
                sources: flow.source_taps(),
                sinks: flow.sink_taps(),
                checkpoints: flow.checkpoint_taps(),
            })?;
            // endpoints that want lifecycle events register themselves here
            listeners.extend(flow.endpoint_listeners());
            let stored = flows.push(flow);
            debug_assert_eq!(stored, id);
        }

        let graph = FlowGraph::derive(&taps)?;
        let name = self.name.unwrap_or_else(|| auto_name(&taps));
        log::debug!(
            "cascade \"{name}\": {} flows over {} taps",
            taps.num_flows(),
            taps.num_taps(),
        );

        let core = CascadeCore::new(
            name,
            flows,
            taps,
            graph,
            listeners,
            Arc::new(SkipStaleSinks),
            self.spawner
                .unwrap_or_else(|| Arc::new(ThreadPoolSpawner::new())),
            self.max_concurrent,
        );
        Ok(Cascade::new(core))
    }
}

impl Default for CascadeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn auto_name(taps: &TapGraph) -> String {
    (0..taps.num_flows())
        .map(|i| taps.flow_name(FlowId::from(i)))
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ConfigurationError;
    use anyhow::Result;

    struct Leg {
        name: &'static str,
        sources: Vec<String>,
        sinks: Vec<String>,
    }

    impl Leg {
        fn boxed(name: &'static str, sources: &[&str], sinks: &[&str]) -> Box<dyn Flow> {
            Box::new(Self {
                name,
                sources: sources.iter().map(|s| s.to_string()).collect(),
                sinks: sinks.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    impl Flow for Leg {
        fn name(&self) -> &str {
            self.name
        }
        fn source_taps(&self) -> Vec<String> {
            self.sources.clone()
        }
        fn sink_taps(&self) -> Vec<String> {
            self.sinks.clone()
        }
        fn run_to_completion(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_auto_name_joins_flow_names() -> Result<()> {
        let cascade = CascadeBuilder::new()
            .add_flow(Leg::boxed("first", &[], &["a"]))
            .add_flow(Leg::boxed("second", &["a"], &["b"]))
            .build()?;
        assert_eq!(cascade.name(), "first+second");
        Ok(())
    }

    #[test]
    fn test_explicit_name_wins() -> Result<()> {
        let cascade = CascadeBuilder::new()
            .name("nightly")
            .add_flow(Leg::boxed("only", &[], &["a"]))
            .build()?;
        assert_eq!(cascade.name(), "nightly");
        Ok(())
    }

    #[test]
    fn test_duplicate_flow_name_is_rejected() {
        let err = CascadeBuilder::new()
            .add_flow(Leg::boxed("twin", &[], &["a"]))
            .add_flow(Leg::boxed("twin", &[], &["b"]))
            .build()
            .err()
            .expect("same name twice");
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::DuplicateFlowName(name)) if name == "twin"
        ));
    }

    #[test]
    fn test_duplicate_sink_names_both_flows() {
        let err = CascadeBuilder::new()
            .add_flow(Leg::boxed("one", &[], &["shared"]))
            .add_flow(Leg::boxed("two", &[], &["shared"]))
            .build()
            .err()
            .expect("two writers of one tap");
        match err.downcast_ref::<ConfigurationError>() {
            Some(ConfigurationError::DuplicateSink { tap, existing, adding }) => {
                assert_eq!(tap, "shared");
                assert_eq!(existing, "one");
                assert_eq!(adding, "two");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cycle_is_rejected_at_build() {
        let err = CascadeBuilder::new()
            .add_flow(Leg::boxed("ouro", &["tail"], &["head"]))
            .add_flow(Leg::boxed("boros", &["head"], &["tail"]))
            .build()
            .err()
            .expect("two flows feeding each other");
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_queries_reflect_the_graph() -> Result<()> {
        let cascade = CascadeBuilder::new()
            .flows([
                Leg::boxed("load", &[], &["raw"]),
                Leg::boxed("clean", &["raw"], &["tidy"]),
                Leg::boxed("report", &["tidy"], &["out"]),
            ])
            .build()?;

        let names: Vec<&str> = cascade.flows().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["load", "clean", "report"]);

        assert_eq!(cascade.head_flows()[0].name(), "load");
        assert_eq!(cascade.tail_flows()[0].name(), "report");
        assert_eq!(cascade.intermediate_flows()[0].name(), "clean");

        assert_eq!(cascade.predecessors("clean")[0].name(), "load");
        assert_eq!(cascade.successors("clean")[0].name(), "report");
        assert!(cascade.predecessors("missing").is_empty());

        // "load" reads nothing, so no tap in this cascade is source-only
        assert!(cascade.source_taps().is_empty());
        assert_eq!(cascade.sink_taps(), vec!["out"]);
        assert_eq!(cascade.intermediate_taps(), vec!["raw", "tidy"]);
        Ok(())
    }
}
