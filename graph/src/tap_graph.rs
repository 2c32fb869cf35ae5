use std::hash::BuildHasher;

use hashbrown::hash_map::RawEntryMut;
use util::{HashSet, Hasher, IdVec};

use crate::{Error, FlowId, TapId};

/// Declared taps of one flow, used to insert it into a [`TapGraph`].
#[derive(Debug, Default)]
pub struct FlowTaps {
    pub name: String,
    pub sources: Vec<String>,
    pub sinks: Vec<String>,
    pub checkpoints: Vec<String>,
}

/// One tap node: its identifier string and the flows on either side of it.
#[derive(Debug)]
pub(crate) struct Tap {
    pub(crate) name: String,
    pub(crate) readers: Vec<FlowId>,
    pub(crate) writers: Vec<FlowId>,
    pub(crate) checkpoint: bool,
}

impl Tap {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            readers: Vec::new(),
            writers: Vec::new(),
            checkpoint: false,
        }
    }
}

/// One flow and the tap ids it connects.
#[derive(Debug)]
pub(crate) struct FlowNode {
    pub(crate) name: String,
    pub(crate) sources: Vec<TapId>,
    pub(crate) sinks: Vec<TapId>,
    pub(crate) checkpoints: Vec<TapId>,
}

/// Maps tap identifier strings to dense ids without storing each string twice.
/// The map's key is the id we can use to look the tap up in the tap table,
/// and string contents live only in the table.
#[derive(Debug, Default)]
struct TapIds {
    map: hashbrown::HashMap<TapId, (), ()>,
    hasher: Hasher,
}

impl TapIds {
    fn get(&self, name: &str, taps: &IdVec<TapId, Tap>) -> Option<TapId> {
        let hash = self.hasher.hash_one(name);
        self.map
            .raw_entry()
            .from_hash(hash, |id| taps.get(*id).name == name)
            .map(|(id, ())| *id)
    }

    fn intern(&mut self, name: &str, taps: &mut IdVec<TapId, Tap>) -> TapId {
        let hash = self.hasher.hash_one(name);
        let entry = self
            .map
            .raw_entry_mut()
            .from_hash(hash, |id| taps.get(*id).name == name);
        match entry {
            RawEntryMut::Occupied(entry) => *entry.into_key(),
            RawEntryMut::Vacant(entry) => {
                let id = taps.push(Tap::new(name));
                entry.insert_with_hasher(hash, id, (), |id| {
                    self.hasher.hash_one(taps.get(*id).name.as_str())
                });
                id
            }
        }
    }
}

/// Taps as nodes, flows as labeled edges from the taps they read to the taps
/// they write.
///
/// Built once per cascade by inserting flows one at a time; insertion is where
/// duplicate flow names and duplicate sinks are rejected, so the second
/// offending flow fails rather than the whole batch.
#[derive(Debug, Default)]
pub struct TapGraph {
    taps: IdVec<TapId, Tap>,
    lookup: TapIds,
    flows: IdVec<FlowId, FlowNode>,
}

impl TapGraph {
    /// Insert a flow, connecting its source taps to its sink and checkpoint
    /// taps. Fails if the flow's name is already taken, or if any of its
    /// sinks already has a writer.
    pub fn add_flow(&mut self, flow: FlowTaps) -> Result<FlowId, Error> {
        if self.flows.iter().any(|f| f.name == flow.name) {
            return Err(Error::DuplicateFlowName(flow.name));
        }

        // reject double writers before touching the graph:
        let mut writes: HashSet<&str> = HashSet::default();
        for tap in flow.sinks.iter().chain(&flow.checkpoints) {
            if !writes.insert(tap.as_str()) {
                return Err(Error::DuplicateSink {
                    tap: tap.clone(),
                    existing: flow.name.clone(),
                    adding: flow.name.clone(),
                });
            }
            if let Some(id) = self.lookup.get(tap, &self.taps) {
                if let Some(writer) = self.taps.get(id).writers.first() {
                    return Err(Error::DuplicateSink {
                        tap: tap.clone(),
                        existing: self.flows.get(*writer).name.clone(),
                        adding: flow.name.clone(),
                    });
                }
            }
        }

        let FlowTaps {
            name,
            sources,
            sinks,
            checkpoints,
        } = flow;
        let id = self.flows.push(FlowNode {
            name,
            sources: Vec::with_capacity(sources.len()),
            sinks: Vec::with_capacity(sinks.len()),
            checkpoints: Vec::with_capacity(checkpoints.len()),
        });

        for tap in &sources {
            let tap_id = self.lookup.intern(tap, &mut self.taps);
            let node = self.flows.get_mut(id);
            // a tap listed twice reads the same data once:
            if !node.sources.contains(&tap_id) {
                node.sources.push(tap_id);
                self.taps.get_mut(tap_id).readers.push(id);
            }
        }
        for tap in &sinks {
            let tap_id = self.lookup.intern(tap, &mut self.taps);
            self.taps.get_mut(tap_id).writers.push(id);
            self.flows.get_mut(id).sinks.push(tap_id);
        }
        for tap in &checkpoints {
            let tap_id = self.lookup.intern(tap, &mut self.taps);
            let node = self.taps.get_mut(tap_id);
            node.writers.push(id);
            node.checkpoint = true;
            self.flows.get_mut(id).checkpoints.push(tap_id);
        }

        log::trace!(
            "added flow \"{}\": {} sources, {} sinks, {} checkpoints",
            self.flows.get(id).name,
            sources.len(),
            sinks.len(),
            checkpoints.len(),
        );
        Ok(id)
    }

    /// Number of flows inserted so far.
    #[inline]
    pub fn num_flows(&self) -> usize {
        self.flows.len()
    }

    /// Number of distinct taps referenced so far.
    #[inline]
    pub fn num_taps(&self) -> usize {
        self.taps.len()
    }

    /// Name of the flow with the given id.
    #[inline]
    pub fn flow_name(&self, flow: FlowId) -> &str {
        &self.flows.get(flow).name
    }

    /// Id of the flow with the given name, if any.
    pub fn flow_id(&self, name: &str) -> Option<FlowId> {
        self.flows
            .entries()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    /// Flows that read the given tap.
    pub fn flows_reading(&self, tap: &str) -> &[FlowId] {
        match self.lookup.get(tap, &self.taps) {
            Some(id) => &self.taps.get(id).readers,
            None => &[],
        }
    }

    /// Flows that write the given tap.
    pub fn flows_writing(&self, tap: &str) -> &[FlowId] {
        match self.lookup.get(tap, &self.taps) {
            Some(id) => &self.taps.get(id).writers,
            None => &[],
        }
    }

    /// Taps read by some flow but written by none: the cascade's external inputs.
    pub fn source_taps(&self) -> Vec<&str> {
        self.taps
            .iter()
            .filter(|t| t.writers.is_empty())
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Taps written by some flow but read by none: the cascade's final outputs.
    pub fn sink_taps(&self) -> Vec<&str> {
        self.taps
            .iter()
            .filter(|t| t.readers.is_empty())
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Taps both written and read inside the cascade. Checkpoints read by a
    /// downstream flow show up here as well as in [`Self::checkpoint_taps`].
    pub fn intermediate_taps(&self) -> Vec<&str> {
        self.taps
            .iter()
            .filter(|t| !t.readers.is_empty() && !t.writers.is_empty())
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Taps declared as checkpoints by their writing flow.
    pub fn checkpoint_taps(&self) -> Vec<&str> {
        self.taps
            .iter()
            .filter(|t| t.checkpoint)
            .map(|t| t.name.as_str())
            .collect()
    }

    pub(crate) fn taps(&self) -> impl Iterator<Item = &Tap> {
        self.taps.iter()
    }

    pub(crate) fn flow_nodes(&self) -> impl Iterator<Item = (FlowId, &FlowNode)> {
        self.flows.entries()
    }
}
