use crate::foundation::error::{EngineError, EngineResult};

/// Stable identity of a node for its whole life inside a graph.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub u64);

/// Time at which a node is evaluated, in timeline frames.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct FrameTime(pub i64);

/// One image channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
    Depth,
    Mask,
}

impl Channel {
    /// All channels in canonical storage order.
    pub const ALL: [Channel; 6] = [
        Channel::Red,
        Channel::Green,
        Channel::Blue,
        Channel::Alpha,
        Channel::Depth,
        Channel::Mask,
    ];

    fn bit(self) -> u8 {
        match self {
            Channel::Red => 1 << 0,
            Channel::Green => 1 << 1,
            Channel::Blue => 1 << 2,
            Channel::Alpha => 1 << 3,
            Channel::Depth => 1 << 4,
            Channel::Mask => 1 << 5,
        }
    }
}

/// Set of channels, iterated in canonical order (`r, g, b, a, depth, mask`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelSet(u8);

impl ChannelSet {
    pub const NONE: ChannelSet = ChannelSet(0);
    pub const RGB: ChannelSet = ChannelSet(0b0111);
    pub const RGBA: ChannelSet = ChannelSet(0b1111);
    pub const ALPHA: ChannelSet = ChannelSet(0b1000);
    pub const ALL: ChannelSet = ChannelSet(0b11_1111);

    pub fn from_channels(channels: &[Channel]) -> Self {
        channels.iter().fold(Self::NONE, |acc, c| acc.with(*c))
    }

    pub fn with(self, c: Channel) -> Self {
        Self(self.0 | c.bit())
    }

    pub fn without(self, c: Channel) -> Self {
        Self(self.0 & !c.bit())
    }

    pub fn contains(self, c: Channel) -> bool {
        self.0 & c.bit() != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels in the set.
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Position of `c` inside the set's storage order, if present.
    pub fn index_of(self, c: Channel) -> Option<usize> {
        if !self.contains(c) {
            return None;
        }
        Some((self.0 & (c.bit() - 1)).count_ones() as usize)
    }

    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    pub(crate) fn bits(self) -> u8 {
        self.0
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl serde::Serialize for ChannelSet {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(self.iter())
    }
}

impl<'de> serde::Deserialize<'de> for ChannelSet {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let channels = Vec::<Channel>::deserialize(d)?;
        Ok(Self::from_channels(&channels))
    }
}

/// Half-open horizontal span `[x, r)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct XRange {
    /// Inclusive left edge.
    pub x: i32,
    /// Exclusive right edge.
    pub r: i32,
}

impl XRange {
    pub fn new(x: i32, r: i32) -> EngineResult<Self> {
        if x > r {
            return Err(EngineError::validation("XRange x must be <= r"));
        }
        Ok(Self { x, r })
    }

    pub fn width(self) -> usize {
        (self.r - self.x).max(0) as usize
    }

    pub fn is_empty(self) -> bool {
        self.r <= self.x
    }

    pub fn contains(self, x: i32) -> bool {
        self.x <= x && x < self.r
    }

    /// Grow both edges by `n` pixels.
    pub fn pad(self, n: i32) -> Self {
        Self {
            x: self.x.saturating_sub(n),
            r: self.r.saturating_add(n),
        }
    }
}

/// Half-open pixel box: columns `[x, r)`, scanlines `[y, t)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub r: i32,
    pub t: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, r: i32, t: i32) -> EngineResult<Self> {
        if x > r || y > t {
            return Err(EngineError::validation(
                "Region requires x <= r and y <= t",
            ));
        }
        Ok(Self { x, y, r, t })
    }

    /// Region anchored at the origin.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            r: width.min(i32::MAX as u32) as i32,
            t: height.min(i32::MAX as u32) as i32,
        }
    }

    pub fn width(self) -> usize {
        (self.r - self.x).max(0) as usize
    }

    pub fn height(self) -> usize {
        (self.t - self.y).max(0) as usize
    }

    pub fn is_empty(self) -> bool {
        self.r <= self.x || self.t <= self.y
    }

    pub fn x_range(self) -> XRange {
        XRange {
            x: self.x,
            r: self.r,
        }
    }

    /// First and last scanline (inclusive), or `None` for an empty region.
    pub fn rows(self) -> Option<(i32, i32)> {
        if self.is_empty() {
            None
        } else {
            Some((self.y, self.t - 1))
        }
    }

    /// Smallest region covering both. Empty regions are ignored.
    pub fn union(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Self {
            x: self.x.min(other.x),
            y: self.y.min(other.y),
            r: self.r.max(other.r),
            t: self.t.max(other.t),
        }
    }

    /// Grow horizontally by `dx` and vertically by `dy`.
    pub fn pad(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_sub(dx),
            y: self.y.saturating_sub(dy),
            r: self.r.saturating_add(dx),
            t: self.t.saturating_add(dy),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
