use parking_lot::RwLock;

use crate::foundation::core::{Channel, ChannelSet, FrameTime, NodeId, XRange};
use crate::foundation::error::{EngineError, EngineResult};
use crate::node::context::RowContext;
use crate::node::{Node, VersionStamp};
use crate::ops::fill_row;

/// Color grade parameters, applied to red, green and blue. Alpha passes through.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GradeParams {
    pub gain: f32,
    pub lift: f32,
    pub gamma: f32,
}

impl Default for GradeParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            lift: 0.0,
            gamma: 1.0,
        }
    }
}

impl GradeParams {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.gain.is_finite() || !self.lift.is_finite() {
            return Err(EngineError::validation("grade gain and lift must be finite"));
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(EngineError::validation("grade gamma must be > 0"));
        }
        Ok(())
    }

    /// `(lift + gain * v) ^ (1 / gamma)`, with negative intermediates clamped to 0.
    pub fn apply(&self, v: f32) -> f32 {
        let v = (self.lift + self.gain * v).max(0.0);
        if self.gamma == 1.0 {
            v
        } else {
            v.powf(1.0 / self.gamma)
        }
    }
}

/// Gain, lift and gamma on one input.
#[derive(Debug)]
pub struct Grade {
    id: NodeId,
    params: RwLock<GradeParams>,
    version: VersionStamp,
}

impl Grade {
    pub fn new(id: NodeId, params: GradeParams) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            id,
            params: RwLock::new(params),
            version: VersionStamp::new(),
        })
    }

    pub fn params(&self) -> GradeParams {
        *self.params.read()
    }

    /// Replace the parameters. Rows graded under the old values are never served again.
    pub fn set_params(&self, params: GradeParams) -> EngineResult<()> {
        params.validate()?;
        *self.params.write() = params;
        self.version.bump();
        Ok(())
    }
}

impl Node for Grade {
    fn name(&self) -> &str {
        "grade"
    }

    fn identity(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn input_count(&self) -> usize {
        1
    }

    fn get(
        &self,
        ctx: &RowContext<'_>,
        y: i32,
        _time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        let params = self.params();
        let src = ctx.input_row(0, y, x_range, channels)?;
        Ok(fill_row(x_range, channels, |c, x| {
            let v = src.sample(c, x);
            match c {
                Channel::Red | Channel::Green | Channel::Blue => params.apply(v),
                _ => v,
            }
        }))
    }
}

/// `1 - v` on red, green and blue.
#[derive(Debug)]
pub struct Invert {
    id: NodeId,
    version: VersionStamp,
}

impl Invert {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            version: VersionStamp::new(),
        }
    }
}

impl Node for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn identity(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn input_count(&self) -> usize {
        1
    }

    fn get(
        &self,
        ctx: &RowContext<'_>,
        y: i32,
        _time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        let src = ctx.input_row(0, y, x_range, channels)?;
        Ok(fill_row(x_range, channels, |c, x| {
            let v = src.sample(c, x);
            match c {
                Channel::Red | Channel::Green | Channel::Blue => 1.0 - v,
                _ => v,
            }
        }))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ops/color.rs"]
mod tests;
