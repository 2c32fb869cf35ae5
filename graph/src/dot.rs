use std::io::{self, Write};

use crate::TapGraph;

/// Render the tap graph in DOT format: one node per tap, one labeled edge per
/// flow from each of its sources to each of its sinks and checkpoints.
pub fn write_dot<W: Write>(graph: &TapGraph, w: &mut W) -> io::Result<()> {
    writeln!(w, "digraph taps {{")?;
    for (i, tap) in graph.taps().enumerate() {
        writeln!(w, "  t{} [label=\"{}\"];", i, escape(&tap.name))?;
    }
    for (_, flow) in graph.flow_nodes() {
        for &src in &flow.sources {
            for &sink in flow.sinks.iter().chain(&flow.checkpoints) {
                writeln!(
                    w,
                    "  t{} -> t{} [label=\"{}\"];",
                    usize::from(src),
                    usize::from(sink),
                    escape(&flow.name),
                )?;
            }
        }
    }
    writeln!(w, "}}")
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod test {
    use super::write_dot;
    use crate::{FlowTaps, TapGraph};

    #[test]
    fn test_renders_nodes_and_labeled_edges() {
        let mut g = TapGraph::default();
        g.add_flow(FlowTaps {
            name: "copy".to_owned(),
            sources: vec!["in".to_owned()],
            sinks: vec!["out".to_owned()],
            checkpoints: Vec::new(),
        })
        .unwrap();

        let mut buf = Vec::new();
        write_dot(&g, &mut buf).unwrap();
        let dot = String::from_utf8(buf).unwrap();

        assert!(dot.starts_with("digraph taps {"));
        assert!(dot.contains("t0 [label=\"in\"];"));
        assert!(dot.contains("t1 [label=\"out\"];"));
        assert!(dot.contains("t0 -> t1 [label=\"copy\"];"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_escapes_quotes_in_identifiers() {
        let mut g = TapGraph::default();
        g.add_flow(FlowTaps {
            name: "f".to_owned(),
            sources: vec!["say \"hi\"".to_owned()],
            sinks: vec!["out".to_owned()],
            checkpoints: Vec::new(),
        })
        .unwrap();

        let mut buf = Vec::new();
        write_dot(&g, &mut buf).unwrap();
        let dot = String::from_utf8(buf).unwrap();
        assert!(dot.contains("label=\"say \\\"hi\\\"\""));
    }
}
