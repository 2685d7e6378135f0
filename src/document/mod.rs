//! JSON graph documents: nodes, edges and the output node, built into a [`Dag`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::cache::store::CachePriority;
use crate::engine::dag::Dag;
use crate::foundation::core::NodeId;
use crate::foundation::error::{EngineError, EngineResult};
use crate::node::Node;
use crate::ops::blur::BoxBlur;
use crate::ops::color::{Grade, GradeParams, Invert};
use crate::ops::merge::Merge;
use crate::ops::source::{Axis, Checkerboard, Constant, Ramp};
use crate::ops::{Prioritized, Rgba};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDocument {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Key of the node whose pixels are rendered.
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    /// Document-local key, referenced by edges and `output`.
    pub id: String,
    pub op: OpSpec,
    /// Overrides the operator's cache priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<CachePriority>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpSpec {
    Constant {
        color: Rgba,
    },
    Ramp {
        from: Rgba,
        to: Rgba,
        #[serde(default)]
        axis: Axis,
        span: u32,
    },
    Checkerboard {
        size: u32,
        a: Rgba,
        b: Rgba,
    },
    Grade(GradeParams),
    Invert,
    BoxBlur {
        radius: u32,
        /// Vertical radius; defaults to `radius`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        radius_y: Option<u32>,
    },
    Merge {
        #[serde(default = "full_mix")]
        mix: f32,
    },
}

fn full_mix() -> f32 {
    1.0
}

impl OpSpec {
    pub fn instantiate(&self, id: NodeId) -> EngineResult<Arc<dyn Node>> {
        Ok(match *self {
            OpSpec::Constant { color } => Arc::new(Constant::new(id, color)),
            OpSpec::Ramp {
                from,
                to,
                axis,
                span,
            } => Arc::new(Ramp::new(id, from, to, axis, span)?),
            OpSpec::Checkerboard { size, a, b } => Arc::new(Checkerboard::new(id, size, a, b)?),
            OpSpec::Grade(params) => Arc::new(Grade::new(id, params)?),
            OpSpec::Invert => Arc::new(Invert::new(id)),
            OpSpec::BoxBlur { radius, radius_y } => {
                Arc::new(BoxBlur::new(id, radius, radius_y.unwrap_or(radius))?)
            }
            OpSpec::Merge { mix } => Arc::new(Merge::new(id, mix)?),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub slot: usize,
}

/// Node ids assigned while building a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltGraph {
    pub output: NodeId,
    pub ids: BTreeMap<String, NodeId>,
}

impl BuiltGraph {
    pub fn id(&self, key: &str) -> Option<NodeId> {
        self.ids.get(key).copied()
    }
}

impl GraphDocument {
    pub fn from_json_str(s: &str) -> EngineResult<Self> {
        let doc: Self = serde_json::from_str(s)
            .map_err(|e| EngineError::validation(format!("invalid graph JSON: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::validation(format!("read graph '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Structural checks that do not need a graph: unique keys and resolvable references.
    pub fn validate(&self) -> EngineResult<()> {
        if self.nodes.is_empty() {
            return Err(EngineError::validation(
                "graph must contain at least one node",
            ));
        }
        let mut keys = BTreeMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(EngineError::validation(format!("node #{i} has an empty id")));
            }
            if keys.insert(node.id.as_str(), i).is_some() {
                return Err(EngineError::validation(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }
        for edge in &self.edges {
            for key in [&edge.from, &edge.to] {
                if !keys.contains_key(key.as_str()) {
                    return Err(EngineError::validation(format!(
                        "edge '{}' -> '{}' references unknown node '{key}'",
                        edge.from, edge.to
                    )));
                }
            }
        }
        if !keys.contains_key(self.output.as_str()) {
            return Err(EngineError::validation(format!(
                "output references unknown node '{}'",
                self.output
            )));
        }
        Ok(())
    }

    /// Add every node and edge to `dag`. Ids continue after the largest id already present.
    ///
    /// On error the graph may hold a partial build.
    pub fn build(&self, dag: &mut Dag) -> EngineResult<BuiltGraph> {
        self.validate()?;
        let first = dag.node_ids().map(|id| id.0).max().map_or(1, |m| m + 1);

        let mut ids = BTreeMap::new();
        for (i, spec) in self.nodes.iter().enumerate() {
            let id = NodeId(first + i as u64);
            let mut node = spec.op.instantiate(id)?;
            if let Some(priority) = spec.priority {
                node = Arc::new(Prioritized::new(node, priority));
            }
            dag.add_node(node)?;
            ids.insert(spec.id.clone(), id);
        }
        for edge in &self.edges {
            let (Some(&from), Some(&to)) = (ids.get(&edge.from), ids.get(&edge.to)) else {
                continue;
            };
            dag.connect(to, edge.slot, from).map_err(|e| {
                EngineError::validation(format!(
                    "edge '{}' -> '{}' (slot {}): {e}",
                    edge.from, edge.to, edge.slot
                ))
            })?;
        }

        let output = ids
            .get(&self.output)
            .copied()
            .ok_or_else(|| EngineError::validation("output node was not built"))?;
        Ok(BuiltGraph { output, ids })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/document/mod.rs"]
mod tests;
