//! The node capability consumed by the engine core.

pub(crate) mod context;
pub(crate) mod instance;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::store::CachePriority;
use crate::foundation::core::{ChannelSet, FrameTime, NodeId, Region, XRange};
use crate::foundation::error::EngineResult;
use crate::node::context::RowContext;

/// Anything that can produce one scanline on demand.
///
/// Implementations must be deterministic for a given `(version, y, time, x_range, channels)` and
/// must bump [`version`](Node::version) whenever a parameter change alters their output. `get`
/// may block on upstream rows through the [`RowContext`].
pub trait Node: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Identity, stable for the node's whole life.
    fn identity(&self) -> NodeId;

    /// Parameter version; changes whenever output-affecting state changes.
    fn version(&self) -> u64;

    /// Number of input slots.
    fn input_count(&self) -> usize {
        0
    }

    /// Region required from input `input` to produce `output` (region of interest).
    fn request(&self, output: Region, input: usize) -> Region {
        let _ = input;
        output
    }

    /// Channels required from input `input` to produce `channels`.
    fn input_channels(&self, channels: ChannelSet, input: usize) -> ChannelSet {
        let _ = input;
        channels
    }

    /// Eviction hint for rows this node produces.
    fn cache_priority(&self) -> CachePriority {
        CachePriority::Normal
    }

    /// Produce scanline `y` over `x_range`, channel-planar in `channels` storage order.
    fn get(
        &self,
        ctx: &RowContext<'_>,
        y: i32,
        time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>>;
}

/// Monotonic version counter for node implementations.
#[derive(Debug, Default)]
pub struct VersionStamp(AtomicU64);

impl VersionStamp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance the version; returns the new value.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Allocate a planar row buffer of `channels.count()` planes of `width` samples.
pub fn planar_buffer(width: usize, channels: ChannelSet) -> Vec<f32> {
    vec![0.0; width * channels.count()]
}
