use parking_lot::RwLock;

use crate::foundation::core::{ChannelSet, FrameTime, NodeId, XRange};
use crate::foundation::error::{EngineError, EngineResult};
use crate::node::context::RowContext;
use crate::node::{Node, VersionStamp};
use crate::ops::{Rgba, component, fill_row};

/// Fills every pixel with one color.
#[derive(Debug)]
pub struct Constant {
    id: NodeId,
    color: RwLock<Rgba>,
    version: VersionStamp,
}

impl Constant {
    pub fn new(id: NodeId, color: Rgba) -> Self {
        Self {
            id,
            color: RwLock::new(color),
            version: VersionStamp::new(),
        }
    }

    pub fn color(&self) -> Rgba {
        *self.color.read()
    }

    pub fn set_color(&self, color: Rgba) {
        *self.color.write() = color;
        self.version.bump();
    }
}

impl Node for Constant {
    fn name(&self) -> &str {
        "constant"
    }

    fn identity(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn get(
        &self,
        _ctx: &RowContext<'_>,
        _y: i32,
        _time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        let color = self.color();
        Ok(fill_row(x_range, channels, |c, _| component(&color, c)))
    }
}

/// Direction of a [`Ramp`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct RampParams {
    from: Rgba,
    to: Rgba,
    axis: Axis,
    span: u32,
}

/// Linear gradient from `from` at coordinate 0 to `to` at `span - 1`, clamped outside.
#[derive(Debug)]
pub struct Ramp {
    id: NodeId,
    params: RwLock<RampParams>,
    version: VersionStamp,
}

impl Ramp {
    pub fn new(id: NodeId, from: Rgba, to: Rgba, axis: Axis, span: u32) -> EngineResult<Self> {
        if span == 0 {
            return Err(EngineError::validation("ramp span must be > 0"));
        }
        Ok(Self {
            id,
            params: RwLock::new(RampParams {
                from,
                to,
                axis,
                span,
            }),
            version: VersionStamp::new(),
        })
    }

    pub fn set_colors(&self, from: Rgba, to: Rgba) {
        let mut p = self.params.write();
        p.from = from;
        p.to = to;
        drop(p);
        self.version.bump();
    }
}

impl Node for Ramp {
    fn name(&self) -> &str {
        "ramp"
    }

    fn identity(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn get(
        &self,
        _ctx: &RowContext<'_>,
        y: i32,
        _time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        let p = *self.params.read();
        let denom = (p.span.max(2) - 1) as f32;
        let t_at = |coord: i32| (coord as f32 / denom).clamp(0.0, 1.0);
        Ok(fill_row(x_range, channels, |c, x| {
            let t = match p.axis {
                Axis::Horizontal => t_at(x),
                Axis::Vertical => t_at(y),
            };
            let a = component(&p.from, c);
            a + (component(&p.to, c) - a) * t
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CheckerParams {
    size: u32,
    a: Rgba,
    b: Rgba,
}

/// Alternating squares of `size` pixels; the square at the origin uses color `a`.
#[derive(Debug)]
pub struct Checkerboard {
    id: NodeId,
    params: RwLock<CheckerParams>,
    version: VersionStamp,
}

impl Checkerboard {
    pub fn new(id: NodeId, size: u32, a: Rgba, b: Rgba) -> EngineResult<Self> {
        if size == 0 {
            return Err(EngineError::validation("checkerboard size must be > 0"));
        }
        Ok(Self {
            id,
            params: RwLock::new(CheckerParams { size, a, b }),
            version: VersionStamp::new(),
        })
    }

    pub fn set_size(&self, size: u32) -> EngineResult<()> {
        if size == 0 {
            return Err(EngineError::validation("checkerboard size must be > 0"));
        }
        self.params.write().size = size;
        self.version.bump();
        Ok(())
    }
}

impl Node for Checkerboard {
    fn name(&self) -> &str {
        "checkerboard"
    }

    fn identity(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn get(
        &self,
        _ctx: &RowContext<'_>,
        y: i32,
        _time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        let p = *self.params.read();
        let size = i64::from(p.size);
        let cy = i64::from(y).div_euclid(size);
        Ok(fill_row(x_range, channels, |c, x| {
            let cx = i64::from(x).div_euclid(size);
            if (cx + cy).rem_euclid(2) == 0 {
                component(&p.a, c)
            } else {
                component(&p.b, c)
            }
        }))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ops/source.rs"]
mod tests;
