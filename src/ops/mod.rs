//! Built-in scanline operators.

pub(crate) mod blur;
pub(crate) mod color;
pub(crate) mod merge;
pub(crate) mod source;

use std::sync::Arc;

use crate::cache::store::CachePriority;
use crate::foundation::core::{Channel, ChannelSet, FrameTime, NodeId, Region, XRange};
use crate::foundation::error::EngineResult;
use crate::node::context::RowContext;
use crate::node::{Node, planar_buffer};

/// RGBA color components.
pub type Rgba = [f32; 4];

/// Component of `color` for `c`; depth and mask read as `0.0`.
pub(crate) fn component(color: &Rgba, c: Channel) -> f32 {
    match c {
        Channel::Red => color[0],
        Channel::Green => color[1],
        Channel::Blue => color[2],
        Channel::Alpha => color[3],
        Channel::Depth | Channel::Mask => 0.0,
    }
}

/// Build a planar row by sampling `f(channel, x)` over `x_range`.
pub(crate) fn fill_row(
    x_range: XRange,
    channels: ChannelSet,
    mut f: impl FnMut(Channel, i32) -> f32,
) -> Vec<f32> {
    let width = x_range.width();
    let mut buf = planar_buffer(width, channels);
    if width == 0 {
        return buf;
    }
    for (plane, c) in buf.chunks_exact_mut(width).zip(channels.iter()) {
        for (i, v) in plane.iter_mut().enumerate() {
            *v = f(c, x_range.x + i as i32);
        }
    }
    buf
}

/// Overrides the cache priority of the wrapped node's rows.
pub struct Prioritized {
    inner: Arc<dyn Node>,
    priority: CachePriority,
}

impl Prioritized {
    pub fn new(inner: Arc<dyn Node>, priority: CachePriority) -> Self {
        Self { inner, priority }
    }

    pub fn inner(&self) -> &Arc<dyn Node> {
        &self.inner
    }
}

impl Node for Prioritized {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn identity(&self) -> NodeId {
        self.inner.identity()
    }

    fn version(&self) -> u64 {
        self.inner.version()
    }

    fn input_count(&self) -> usize {
        self.inner.input_count()
    }

    fn request(&self, output: Region, input: usize) -> Region {
        self.inner.request(output, input)
    }

    fn input_channels(&self, channels: ChannelSet, input: usize) -> ChannelSet {
        self.inner.input_channels(channels, input)
    }

    fn cache_priority(&self) -> CachePriority {
        self.priority
    }

    fn get(
        &self,
        ctx: &RowContext<'_>,
        y: i32,
        time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        self.inner.get(ctx, y, time, x_range, channels)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ops/mod.rs"]
mod tests;
