use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::fingerprint::{Fingerprint, StableHasher};
use crate::foundation::core::{ChannelSet, FrameTime, NodeId, Region, XRange};
use crate::node::Node;

/// Region and channels the engine planned to fetch from a node during the current render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Window {
    pub(crate) region: Region,
    pub(crate) channels: ChannelSet,
}

/// A node bound to the inputs it is wired to for one evaluation order.
///
/// Instances form an immutable tree snapshot; rewiring the graph produces new instances.
pub struct NodeInstance {
    node: Arc<dyn Node>,
    inputs: Vec<Option<Arc<NodeInstance>>>,
    window: RwLock<Option<Window>>,
    snapshot: RwLock<Option<u64>>,
}

impl NodeInstance {
    pub fn new(node: Arc<dyn Node>, inputs: Vec<Option<Arc<NodeInstance>>>) -> Arc<Self> {
        Arc::new(Self {
            node,
            inputs,
            window: RwLock::new(None),
            snapshot: RwLock::new(None),
        })
    }

    /// Instance with every input slot left unconnected.
    pub fn detached(node: Arc<dyn Node>) -> Arc<Self> {
        let inputs = vec![None; node.input_count()];
        Self::new(node, inputs)
    }

    pub fn id(&self) -> NodeId {
        self.node.identity()
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn node(&self) -> &Arc<dyn Node> {
        &self.node
    }

    pub fn input(&self, slot: usize) -> Option<&Arc<NodeInstance>> {
        self.inputs.get(slot).and_then(Option::as_ref)
    }

    pub fn inputs(&self) -> &[Option<Arc<NodeInstance>>] {
        &self.inputs
    }

    /// Version that also covers everything upstream.
    ///
    /// Hashes the node's own version with the identity and effective version of each wired
    /// input, so editing any upstream node changes every downstream fingerprint. While the engine
    /// holds a version snapshot (during a render) the snapshot is returned as is.
    pub fn effective_version(&self) -> u64 {
        if let Some(v) = *self.snapshot.read() {
            return v;
        }
        self.walk_version(&mut HashMap::new())
    }

    /// Each distinct upstream node is hashed once; ids are unique within one tree.
    fn walk_version(&self, seen: &mut HashMap<NodeId, u64>) -> u64 {
        if let Some(&v) = seen.get(&self.id()) {
            return v;
        }
        let v = self.hash_version(|up| up.walk_version(seen));
        seen.insert(self.id(), v);
        v
    }

    fn hash_version(&self, mut upstream: impl FnMut(&NodeInstance) -> u64) -> u64 {
        let mut h = StableHasher::new();
        h.write_u64(self.node.identity().0);
        h.write_u64(self.node.version());
        h.write_u64(self.inputs.len() as u64);
        for input in &self.inputs {
            match input {
                Some(up) => {
                    h.write_u8(1);
                    h.write_u64(up.id().0);
                    h.write_u64(upstream(up.as_ref()));
                }
                None => h.write_u8(0),
            }
        }
        h.finish_u64()
    }

    /// Pin the effective version, given the already pinned inputs. Inputs must be snapshotted
    /// first.
    pub(crate) fn take_snapshot(&self) -> u64 {
        let v = self.hash_version(NodeInstance::effective_version);
        *self.snapshot.write() = Some(v);
        v
    }

    pub(crate) fn clear_snapshot(&self) {
        *self.snapshot.write() = None;
    }

    pub(crate) fn set_window(&self, window: Option<Window>) {
        *self.window.write() = window;
    }

    pub(crate) fn window(&self) -> Option<Window> {
        *self.window.read()
    }

    /// Widen a consumer's read to the planned window when the window covers it.
    ///
    /// The engine prefetches each node over the union of what its consumers need. Reading the
    /// same (wider) row keeps consumer reads on the prefetched fingerprints instead of computing
    /// narrower duplicates.
    pub(crate) fn widen(
        &self,
        y_start: i32,
        y_end: i32,
        x_range: XRange,
        channels: ChannelSet,
    ) -> (XRange, ChannelSet) {
        let Some(w) = self.window() else {
            return (x_range, channels);
        };
        let planned = w.region.x_range();
        let covers = y_start >= w.region.y
            && y_end < w.region.t
            && x_range.x >= planned.x
            && x_range.r <= planned.r
            && w.channels.intersection(channels) == channels;
        if covers {
            (planned, w.channels)
        } else {
            (x_range, channels)
        }
    }

    pub fn fingerprint(
        &self,
        version: u64,
        y: i32,
        time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> Fingerprint {
        Fingerprint {
            node: self.id(),
            version,
            time,
            y,
            x_range,
            channels,
        }
    }
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstance")
            .field("id", &self.id())
            .field("name", &self.name())
            .field(
                "inputs",
                &self
                    .inputs
                    .iter()
                    .map(|i| i.as_ref().map(|n| n.id()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/node/instance.rs"]
mod tests;
