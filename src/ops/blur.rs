use parking_lot::RwLock;

use crate::foundation::core::{ChannelSet, FrameTime, NodeId, Region, XRange};
use crate::foundation::error::{EngineError, EngineResult};
use crate::node::context::RowContext;
use crate::node::{Node, VersionStamp};
use crate::ops::fill_row;

/// Largest accepted radius on either axis.
pub const MAX_BLUR_RADIUS: u32 = 256;

/// Box filter of `(2 * rx + 1) x (2 * ry + 1)` pixels.
///
/// Reads a padded window of its input: each output row needs `2 * ry + 1` input rows, each
/// `rx` pixels wider on both sides.
#[derive(Debug)]
pub struct BoxBlur {
    id: NodeId,
    radius: RwLock<(u32, u32)>,
    version: VersionStamp,
}

impl BoxBlur {
    pub fn new(id: NodeId, rx: u32, ry: u32) -> EngineResult<Self> {
        validate_radius(rx, ry)?;
        Ok(Self {
            id,
            radius: RwLock::new((rx, ry)),
            version: VersionStamp::new(),
        })
    }

    pub fn radius(&self) -> (u32, u32) {
        *self.radius.read()
    }

    pub fn set_radius(&self, rx: u32, ry: u32) -> EngineResult<()> {
        validate_radius(rx, ry)?;
        *self.radius.write() = (rx, ry);
        self.version.bump();
        Ok(())
    }
}

fn validate_radius(rx: u32, ry: u32) -> EngineResult<()> {
    if rx > MAX_BLUR_RADIUS || ry > MAX_BLUR_RADIUS {
        return Err(EngineError::validation(format!(
            "blur radius must be <= {MAX_BLUR_RADIUS}"
        )));
    }
    Ok(())
}

impl Node for BoxBlur {
    fn name(&self) -> &str {
        "box_blur"
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

    fn request(&self, output: Region, _input: usize) -> Region {
        let (rx, ry) = self.radius();
        output.pad(rx as i32, ry as i32)
    }

    fn get(
        &self,
        ctx: &RowContext<'_>,
        y: i32,
        _time: FrameTime,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Vec<f32>> {
        let (rx, ry) = self.radius();
        let (rx, ry) = (rx as i32, ry as i32);
        let padded = x_range.pad(rx);

        let window = ctx.input_interest(0, y - ry, y + ry, padded, channels)?;
        window.wait();
        let failures = window.failures();
        if let Some(first) = failures.first() {
            return Err(EngineError::evaluation(format!(
                "{} of {} input rows failed; first: {first}",
                failures.len(),
                window.request().row_count()
            )));
        }
        let rows = window.rows();

        // Column sums over the vertical window, then a sliding horizontal sum per channel.
        let width = padded.width();
        let mut sums: Vec<Vec<f32>> = Vec::with_capacity(channels.count());
        for c in channels.iter() {
            let mut col = vec![0.0f32; width];
            for row in &rows {
                for (i, acc) in col.iter_mut().enumerate() {
                    *acc += row.sample(c, padded.x + i as i32);
                }
            }
            let mut prefix = Vec::with_capacity(width + 1);
            prefix.push(0.0f32);
            let mut running = 0.0f32;
            for v in col {
                running += v;
                prefix.push(running);
            }
            sums.push(prefix);
        }

        let area = ((2 * rx + 1) * (2 * ry + 1)) as f32;
        Ok(fill_row(x_range, channels, |c, x| {
            let Some(plane) = channels.index_of(c) else {
                return 0.0;
            };
            let prefix = &sums[plane];
            let lo = (x - rx - padded.x) as usize;
            let hi = (x + rx + 1 - padded.x) as usize;
            (prefix[hi] - prefix[lo]) / area
        }))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ops/blur.rs"]
mod tests;
