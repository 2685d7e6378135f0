use std::fmt;

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::core::{ChannelSet, FrameTime, NodeId, XRange};

const XXH3_SEED: u64 = 0x5ca7_11fe_0c0f_fee5;

/// Composite key of one cached row.
///
/// Two fingerprints are equal iff every field is equal. `version` is the node's *effective*
/// version, so a row computed before a parameter (or upstream) change is never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Producing node.
    pub node: NodeId,
    /// Effective node version at request time.
    pub version: u64,
    /// Evaluation time.
    pub time: FrameTime,
    /// Scanline.
    pub y: i32,
    /// Horizontal extent.
    pub x_range: XRange,
    /// Channels stored in the row.
    pub channels: ChannelSet,
}

impl Fingerprint {
    /// Stable 128-bit digest, used to correlate log lines across threads.
    pub fn digest(&self) -> FingerprintDigest {
        let mut h = StableHasher::new();
        h.write_u64(self.node.0);
        h.write_u64(self.version);
        h.write_i64(self.time.0);
        h.write_i32(self.y);
        h.write_i32(self.x_range.x);
        h.write_i32(self.x_range.r);
        h.write_u8(self.channels.bits());
        h.finish()
    }
}

/// 128-bit digest of a [`Fingerprint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FingerprintDigest {
    pub hi: u64,
    pub lo: u64,
}

impl fmt::Display for FingerprintDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// Order-sensitive hasher with a fixed seed; results are stable across runs and platforms.
pub(crate) struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub(crate) fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn finish_u64(&self) -> u64 {
        self.inner.digest()
    }

    pub(crate) fn finish(self) -> FingerprintDigest {
        let v = self.inner.digest128();
        FingerprintDigest {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/fingerprint.rs"]
mod tests;
