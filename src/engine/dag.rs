use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use smallvec::{SmallVec, smallvec};

use crate::foundation::core::NodeId;
use crate::foundation::error::{EngineError, EngineResult};
use crate::node::Node;

struct DagEntry {
    node: Arc<dyn Node>,
    inputs: SmallVec<[Option<NodeId>; 2]>,
}

/// Node graph topology.
///
/// Every structural mutation bumps [`version`](Dag::version). Node parameter edits are not
/// structural; they show up through [`Node::version`].
#[derive(Default)]
pub struct Dag {
    nodes: BTreeMap<NodeId, DagEntry>,
    version: u64,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural version.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<dyn Node>> {
        self.nodes.get(&id).map(|e| &e.node)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Input wiring of `id`, one entry per slot.
    pub fn inputs(&self, id: NodeId) -> EngineResult<&[Option<NodeId>]> {
        self.nodes
            .get(&id)
            .map(|e| e.inputs.as_slice())
            .ok_or_else(|| unknown(id))
    }

    pub fn add_node(&mut self, node: Arc<dyn Node>) -> EngineResult<NodeId> {
        let id = node.identity();
        if self.nodes.contains_key(&id) {
            return Err(EngineError::graph(format!(
                "node id {} is already in the graph",
                id.0
            )));
        }
        let inputs = smallvec![None; node.input_count()];
        self.nodes.insert(id, DagEntry { node, inputs });
        self.version += 1;
        Ok(id)
    }

    /// Remove a node and disconnect every slot that referenced it.
    pub fn remove_node(&mut self, id: NodeId) -> EngineResult<Arc<dyn Node>> {
        let entry = self.nodes.remove(&id).ok_or_else(|| unknown(id))?;
        for other in self.nodes.values_mut() {
            for slot in other.inputs.iter_mut() {
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        }
        self.version += 1;
        Ok(entry.node)
    }

    /// Wire `src` into input `slot` of `dst`, replacing any previous connection.
    pub fn connect(&mut self, dst: NodeId, slot: usize, src: NodeId) -> EngineResult<()> {
        if !self.nodes.contains_key(&src) {
            return Err(unknown(src));
        }
        let slots = self
            .nodes
            .get(&dst)
            .ok_or_else(|| unknown(dst))?
            .inputs
            .len();
        if slot >= slots {
            return Err(EngineError::graph(format!(
                "node {} has {slots} inputs, cannot connect slot {slot}",
                dst.0
            )));
        }
        if src == dst || self.is_upstream(dst, src) {
            return Err(EngineError::graph(format!(
                "connecting {} -> {} would create a cycle",
                src.0, dst.0
            )));
        }

        if let Some(entry) = self.nodes.get_mut(&dst) {
            entry.inputs[slot] = Some(src);
        }
        self.version += 1;
        Ok(())
    }

    pub fn disconnect(&mut self, dst: NodeId, slot: usize) -> EngineResult<Option<NodeId>> {
        let entry = self.nodes.get_mut(&dst).ok_or_else(|| unknown(dst))?;
        let Some(input) = entry.inputs.get_mut(slot) else {
            return Err(EngineError::graph(format!(
                "node {} has no input slot {slot}",
                dst.0
            )));
        };
        let prev = input.take();
        self.version += 1;
        Ok(prev)
    }

    /// `true` if `candidate` is reachable by walking inputs from `from`.
    fn is_upstream(&self, candidate: NodeId, from: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == candidate {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(entry) = self.nodes.get(&id) {
                stack.extend(entry.inputs.iter().flatten().copied());
            }
        }
        false
    }

    /// Nodes feeding `output` (and `output` itself), inputs before consumers.
    ///
    /// Deterministic: inputs are visited in slot order.
    pub fn topological_order(&self, output: NodeId) -> EngineResult<Vec<NodeId>> {
        if !self.nodes.contains_key(&output) {
            return Err(unknown(output));
        }

        enum Visit {
            Enter(NodeId),
            Exit(NodeId),
        }

        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut active = HashSet::new();
        let mut stack = vec![Visit::Enter(output)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if done.contains(&id) {
                        continue;
                    }
                    if !active.insert(id) {
                        return Err(EngineError::graph(format!(
                            "cycle detected at node {}",
                            id.0
                        )));
                    }
                    stack.push(Visit::Exit(id));
                    let entry = self.nodes.get(&id).ok_or_else(|| unknown(id))?;
                    for src in entry.inputs.iter().rev().flatten() {
                        if !done.contains(src) {
                            stack.push(Visit::Enter(*src));
                        }
                    }
                }
                Visit::Exit(id) => {
                    active.remove(&id);
                    if done.insert(id) {
                        order.push(id);
                    }
                }
            }
        }
        Ok(order)
    }
}

fn unknown(id: NodeId) -> EngineError {
    EngineError::graph(format!("unknown node id {}", id.0))
}

#[cfg(test)]
#[path = "../../tests/unit/engine/dag.rs"]
mod tests;
