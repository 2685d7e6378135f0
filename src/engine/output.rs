use crate::cache::row::RowPin;
use crate::foundation::core::{Channel, ChannelSet, FrameTime, Region};
use crate::foundation::error::RowFailure;

/// Counters for one [`Engine::render`](crate::Engine::render) call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Nodes that had a non-empty region to produce.
    pub nodes_visited: usize,
    /// Interests issued (one per visited node).
    pub interests: usize,
    /// Scanlines requested across all interests.
    pub rows_requested: usize,
    /// Scanlines served from cache at claim time.
    pub rows_hit: usize,
    /// Row tasks submitted to the worker pool.
    pub tasks_scheduled: usize,
    /// Scanlines that failed, at any node.
    pub rows_failed: usize,
}

/// Pixels of the output node over the requested viewport.
///
/// Holds pins on every output row, so the rows stay cached for as long as this value lives.
#[derive(Debug)]
pub struct RenderOutput {
    pub time: FrameTime,
    pub region: Region,
    pub channels: ChannelSet,
    /// One entry per scanline of `region`, top to bottom.
    pub rows: Vec<Result<RowPin, RowFailure>>,
    pub stats: RenderStats,
}

impl RenderOutput {
    pub fn width(&self) -> usize {
        self.region.width()
    }

    pub fn height(&self) -> usize {
        self.region.height()
    }

    pub fn row(&self, y: i32) -> Option<&Result<RowPin, RowFailure>> {
        if y < self.region.y || y >= self.region.t {
            return None;
        }
        self.rows.get((y - self.region.y) as usize)
    }

    /// `true` when every scanline was produced.
    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(Result::is_ok)
    }

    pub fn failures(&self) -> Vec<&RowFailure> {
        self.rows.iter().filter_map(|r| r.as_ref().err()).collect()
    }

    /// Sample at `(x, y)`; `0.0` for failed rows, missing channels, or outside the region.
    pub fn sample(&self, c: Channel, x: i32, y: i32) -> f32 {
        match self.row(y) {
            Some(Ok(row)) => row.sample(c, x),
            _ => 0.0,
        }
    }

    /// Straight-alpha RGBA8 image, row-major.
    ///
    /// Channels the render did not carry are filled with 0 (color) or 255 (alpha). Failed rows
    /// are fully transparent.
    pub fn to_rgba8(&self) -> Vec<u8> {
        fn quantize(v: f32) -> u8 {
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }

        let w = self.width();
        let mut out = vec![0u8; w * self.height() * 4];
        let has_alpha = self.channels.contains(Channel::Alpha);
        for (row_idx, row) in self.rows.iter().enumerate() {
            let Ok(row) = row else {
                continue;
            };
            let base = row_idx * w * 4;
            for (i, px) in out[base..base + w * 4].chunks_exact_mut(4).enumerate() {
                let x = self.region.x + i as i32;
                px[0] = quantize(row.sample(Channel::Red, x));
                px[1] = quantize(row.sample(Channel::Green, x));
                px[2] = quantize(row.sample(Channel::Blue, x));
                px[3] = if has_alpha {
                    quantize(row.sample(Channel::Alpha, x))
                } else {
                    255
                };
            }
        }
        out
    }
}
