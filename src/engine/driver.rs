use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::store::RowCache;
use crate::config::EngineConfig;
use crate::engine::dag::Dag;
use crate::engine::output::{RenderOutput, RenderStats};
use crate::foundation::core::{ChannelSet, FrameTime, NodeId, Region};
use crate::foundation::error::{EngineError, EngineResult, RowError, RowFailure};
use crate::interest::coordinator::{Interest, RowRequest};
use crate::interest::pool::WorkerPool;
use crate::node::instance::{NodeInstance, Window};

/// Evaluation order rooted at one output node.
#[derive(Debug)]
pub struct EvalOrder {
    output: NodeId,
    dag_version: u64,
    nodes: Vec<Arc<NodeInstance>>,
    index: HashMap<NodeId, usize>,
}

impl EvalOrder {
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Structural version of the graph this order was built from.
    pub fn dag_version(&self) -> u64 {
        self.dag_version
    }

    /// Node ids, inputs before consumers; the output is last.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn instance(&self, id: NodeId) -> Option<&Arc<NodeInstance>> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }
}

/// What one node must produce for a render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Demand {
    pub node: NodeId,
    pub region: Region,
    pub channels: ChannelSet,
}

/// Drives a [`Dag`]: keeps an evaluation order and pulls renders through the row cache.
pub struct Engine {
    config: EngineConfig,
    cache: RowCache,
    pool: WorkerPool,
    dag: Dag,
    order: Option<EvalOrder>,
    tree_version: u64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let cache = RowCache::new(config.cache);
        Self::with_cache(config, cache)
    }

    /// Engine that shares an existing cache, e.g. with other engines in the process.
    pub fn with_cache(config: EngineConfig, cache: RowCache) -> EngineResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.workers)?;
        Ok(Self {
            config,
            cache,
            pool,
            dag: Dag::new(),
            order: None,
            tree_version: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &RowCache {
        &self.cache
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Mutable graph access. Structural edits are picked up by the next render.
    pub fn dag_mut(&mut self) -> &mut Dag {
        &mut self.dag
    }

    pub fn order(&self) -> Option<&EvalOrder> {
        self.order.as_ref()
    }

    pub fn tree_version(&self) -> u64 {
        self.tree_version
    }

    /// Bump the structural version. Cached rows are untouched; they are keyed by node versions.
    pub fn change_tree_version(&mut self) -> u64 {
        self.tree_version += 1;
        self.tree_version
    }

    /// Select the output node: rebuild the order and bump the tree version.
    pub fn set_output(&mut self, output: NodeId) -> EngineResult<()> {
        self.reset_and_sort(output)?;
        self.change_tree_version();
        Ok(())
    }

    /// Rebuild the evaluation order rooted at `output`.
    ///
    /// Interests created under the previous order stay valid and keep running; they hold their
    /// own node instances.
    #[tracing::instrument(skip(self), fields(output = output.0, dag_version = self.dag.version()))]
    pub fn reset_and_sort(&mut self, output: NodeId) -> EngineResult<()> {
        let ids = self.dag.topological_order(output)?;
        let mut nodes: Vec<Arc<NodeInstance>> = Vec::with_capacity(ids.len());
        let mut index = HashMap::with_capacity(ids.len());
        for id in ids {
            let node = self
                .dag
                .node(id)
                .ok_or_else(|| EngineError::graph(format!("unknown node id {}", id.0)))?;
            let inputs = self
                .dag
                .inputs(id)?
                .iter()
                .map(|src| src.and_then(|s| index.get(&s).map(|&i: &usize| Arc::clone(&nodes[i]))))
                .collect();
            index.insert(id, nodes.len());
            nodes.push(NodeInstance::new(Arc::clone(node), inputs));
        }
        tracing::debug!(nodes = nodes.len(), "evaluation order rebuilt");
        self.order = Some(EvalOrder {
            output,
            dag_version: self.dag.version(),
            nodes,
            index,
        });
        Ok(())
    }

    /// Region and channels each node must produce to satisfy `viewport` at the output.
    ///
    /// Walks the order from the output back to its sources, asking every node what it needs
    /// from each input and unioning the requests of consumers that share an input. Nodes with
    /// nothing to produce are omitted. The result is in evaluation order.
    pub fn plan(&self, viewport: Region, channels: ChannelSet) -> EngineResult<Vec<Demand>> {
        let order = self.current_order()?;
        Ok(plan_order(order, viewport, channels)
            .into_iter()
            .flatten()
            .collect())
    }

    /// Unclaimed interest over rows of a node in the current order.
    pub fn interest(&self, node: NodeId, request: RowRequest) -> EngineResult<Interest> {
        let order = self.current_order()?;
        let instance = order.instance(node).ok_or_else(|| {
            EngineError::graph(format!("node {} is not upstream of the output", node.0))
        })?;
        Ok(Interest::new(
            Arc::clone(instance),
            request,
            &self.cache,
            &self.pool,
        ))
    }

    /// Render `viewport` of the output node at `time`.
    ///
    /// Nodes are visited inputs first. Each node with a non-empty region gets one interest that
    /// must finish before its consumers start; an input's rows stay pinned until every consumer
    /// of it has finished. Failed scanlines are reported per row, never as an error.
    #[tracing::instrument(skip(self), fields(time = time.0, width = viewport.width(), height = viewport.height()))]
    pub fn render(
        &mut self,
        time: FrameTime,
        viewport: Region,
        channels: ChannelSet,
    ) -> EngineResult<RenderOutput> {
        if viewport.is_empty() {
            return Err(EngineError::validation("render viewport must be non-empty"));
        }
        if channels.is_empty() {
            return Err(EngineError::validation("render needs at least one channel"));
        }
        self.resort_if_stale()?;

        let order = self.current_order()?;
        let _versions = VersionSnapshot::take(&order.nodes);
        let demands = plan_order(order, viewport, channels);
        for (instance, demand) in order.nodes.iter().zip(&demands) {
            instance.set_window(demand.map(|d| Window {
                region: d.region,
                channels: d.channels,
            }));
        }

        let mut consumers = vec![0usize; order.nodes.len()];
        for (i, instance) in order.nodes.iter().enumerate() {
            if demands[i].is_none() {
                continue;
            }
            for src in instance.inputs().iter().flatten() {
                if let Some(&j) = order.index.get(&src.id())
                    && demands[j].is_some()
                {
                    consumers[j] += 1;
                }
            }
        }

        let mut stats = RenderStats::default();
        let mut live: Vec<Option<Interest>> = std::iter::repeat_with(|| None)
            .take(order.nodes.len())
            .collect();
        for (i, instance) in order.nodes.iter().enumerate() {
            let Some(demand) = demands[i] else {
                continue;
            };
            let request = RowRequest::from_region(demand.region, time, demand.channels)?;
            let interest = Interest::new(Arc::clone(instance), request, &self.cache, &self.pool);
            interest.claim_interest();
            interest.wait();

            let s = interest.stats();
            stats.nodes_visited += 1;
            stats.interests += 1;
            stats.rows_requested += s.rows;
            stats.rows_hit += s.hits;
            stats.tasks_scheduled += s.scheduled;
            stats.rows_failed += s.failed;
            if s.failed > 0 {
                tracing::warn!(node = %instance.name(), failed = s.failed, "scanlines failed");
            }
            live[i] = Some(interest);

            for src in instance.inputs().iter().flatten() {
                if let Some(&j) = order.index.get(&src.id())
                    && consumers[j] > 0
                {
                    consumers[j] -= 1;
                    if consumers[j] == 0 {
                        live[j] = None;
                    }
                }
            }
        }

        let out_idx = order.nodes.len() - 1;
        let output = live[out_idx]
            .take()
            .ok_or_else(|| EngineError::evaluation("output node produced no interest"))?;
        let node = output.node().id();
        let rows = (viewport.y..viewport.t)
            .map(|y| match output.at(y) {
                Ok(pin) => Ok(pin),
                Err(RowError::Failed(failure)) => Err(failure),
                Err(other) => Err(RowFailure::new(node, y, other.to_string())),
            })
            .collect();
        drop(live);
        drop(output);

        let evicted = self.cache.evict_if_needed();
        tracing::debug!(?stats, evicted, "render finished");
        Ok(RenderOutput {
            time,
            region: viewport,
            channels,
            rows,
            stats,
        })
    }

    fn current_order(&self) -> EngineResult<&EvalOrder> {
        self.order
            .as_ref()
            .ok_or_else(|| EngineError::graph("no output node selected; call set_output first"))
    }

    fn resort_if_stale(&mut self) -> EngineResult<()> {
        let Some(order) = &self.order else {
            return Err(EngineError::graph(
                "no output node selected; call set_output first",
            ));
        };
        if order.dag_version != self.dag.version() {
            let output = order.output;
            self.set_output(output)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.dag.len())
            .field("order", &self.order.as_ref().map(EvalOrder::node_ids))
            .field("tree_version", &self.tree_version)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Effective versions held fixed for one render, so each is hashed once per node.
struct VersionSnapshot<'a> {
    nodes: &'a [Arc<NodeInstance>],
}

impl<'a> VersionSnapshot<'a> {
    /// `nodes` must list inputs before their consumers.
    fn take(nodes: &'a [Arc<NodeInstance>]) -> Self {
        for node in nodes {
            node.take_snapshot();
        }
        Self { nodes }
    }
}

impl Drop for VersionSnapshot<'_> {
    fn drop(&mut self) {
        for node in self.nodes {
            node.clear_snapshot();
        }
    }
}

/// Backward region-of-interest pass; one slot per node in `order`.
fn plan_order(order: &EvalOrder, viewport: Region, channels: ChannelSet) -> Vec<Option<Demand>> {
    let mut demands: Vec<Option<Demand>> = vec![None; order.nodes.len()];
    let Some(last) = order.nodes.len().checked_sub(1) else {
        return demands;
    };
    demands[last] = Some(Demand {
        node: order.nodes[last].id(),
        region: viewport,
        channels,
    });

    for i in (0..order.nodes.len()).rev() {
        let Some(demand) = demands[i] else {
            continue;
        };
        let instance = &order.nodes[i];
        let node = instance.node();
        for (slot, src) in instance.inputs().iter().enumerate() {
            let Some(src) = src else {
                continue;
            };
            let Some(&j) = order.index.get(&src.id()) else {
                continue;
            };
            let region = node.request(demand.region, slot);
            let wanted = node.input_channels(demand.channels, slot);
            if region.is_empty() || wanted.is_empty() {
                continue;
            }
            demands[j] = Some(match demands[j] {
                Some(prev) => Demand {
                    node: prev.node,
                    region: prev.region.union(region),
                    channels: prev.channels.union(wanted),
                },
                None => Demand {
                    node: src.id(),
                    region,
                    channels: wanted,
                },
            });
        }
    }
    demands
}
