use parking_lot::RwLock;

use crate::foundation::core::{Channel, ChannelSet, FrameTime, NodeId, XRange};
use crate::foundation::error::{EngineError, EngineResult};
use crate::node::context::RowContext;
use crate::node::{Node, VersionStamp};
use crate::ops::fill_row;

/// Input slot of the foreground.
pub const MERGE_A: usize = 0;
/// Input slot of the background.
pub const MERGE_B: usize = 1;

/// Premultiplied `A over B`, with `A` scaled by `mix`.
///
/// A missing input reads as transparent black.
#[derive(Debug)]
pub struct Merge {
    id: NodeId,
    mix: RwLock<f32>,
    version: VersionStamp,
}

impl Merge {
    pub fn new(id: NodeId, mix: f32) -> EngineResult<Self> {
        validate_mix(mix)?;
        Ok(Self {
            id,
            mix: RwLock::new(mix),
            version: VersionStamp::new(),
        })
    }

    pub fn mix(&self) -> f32 {
        *self.mix.read()
    }

    pub fn set_mix(&self, mix: f32) -> EngineResult<()> {
        validate_mix(mix)?;
        *self.mix.write() = mix;
        self.version.bump();
        Ok(())
    }
}

fn validate_mix(mix: f32) -> EngineResult<()> {
    if !mix.is_finite() || !(0.0..=1.0).contains(&mix) {
        return Err(EngineError::validation("merge mix must be in [0, 1]"));
    }
    Ok(())
}

impl Node for Merge {
    fn name(&self) -> &str {
        "merge"
    }

    fn identity(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn input_count(&self) -> usize {
        2
    }

    fn input_channels(&self, channels: ChannelSet, input: usize) -> ChannelSet {
        if input == MERGE_A {
            channels.with(Channel::Alpha)
        } else {
            channels
        }
    }

    fn get(
        &self,
        ctx: &RowContext<'_>,
        y: i32,
        _time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        let mix = self.mix();
        let a = if ctx.has_input(MERGE_A) {
            Some(ctx.input_row(
                MERGE_A,
                y,
                x_range,
                self.input_channels(channels, MERGE_A),
            )?)
        } else {
            None
        };
        let b = if ctx.has_input(MERGE_B) {
            Some(ctx.input_row(MERGE_B, y, x_range, channels)?)
        } else {
            None
        };

        Ok(fill_row(x_range, channels, |c, x| {
            let (av, aa) = a
                .as_ref()
                .map(|row| (row.sample(c, x) * mix, row.sample(Channel::Alpha, x) * mix))
                .unwrap_or((0.0, 0.0));
            let bv = b.as_ref().map(|row| row.sample(c, x)).unwrap_or(0.0);
            av + bv * (1.0 - aa)
        }))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ops/merge.rs"]
mod tests;
