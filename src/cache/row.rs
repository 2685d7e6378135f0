use std::ops::Deref;
use std::sync::Arc;

use crate::cache::fingerprint::Fingerprint;
use crate::cache::store::{CacheShared, CachePriority};
use crate::foundation::core::{Channel, ChannelSet, XRange};
use crate::foundation::error::RowFailure;

/// One computed scanline: one node, one time, one channel set, one x-range.
///
/// Rows only exist once fully computed; the in-flight state lives in the cache entry. The buffer is
/// channel-planar (`channels.count()` planes of `x_range.width()` samples each) and never mutated
/// after construction, so it can be read from any thread without locking.
#[derive(Debug)]
pub struct Row {
    fingerprint: Fingerprint,
    priority: CachePriority,
    data: Box<[f32]>,
}

impl Row {
    pub(crate) fn from_buffer(
        fingerprint: Fingerprint,
        priority: CachePriority,
        data: Vec<f32>,
    ) -> Result<Self, RowFailure> {
        let expected = fingerprint.x_range.width() * fingerprint.channels.count();
        if data.len() != expected {
            return Err(RowFailure::new(
                fingerprint.node,
                fingerprint.y,
                format!(
                    "node produced {} samples, expected {expected} ({} channels x {} px)",
                    data.len(),
                    fingerprint.channels.count(),
                    fingerprint.x_range.width()
                ),
            ));
        }
        Ok(Self {
            fingerprint,
            priority,
            data: data.into_boxed_slice(),
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Eviction priority declared by the producing node.
    pub fn priority(&self) -> CachePriority {
        self.priority
    }

    pub fn y(&self) -> i32 {
        self.fingerprint.y
    }

    pub fn x_range(&self) -> XRange {
        self.fingerprint.x_range
    }

    pub fn channels(&self) -> ChannelSet {
        self.fingerprint.channels
    }

    pub fn width(&self) -> usize {
        self.fingerprint.x_range.width()
    }

    /// Samples of one channel plane, `None` if the row does not carry it.
    pub fn channel(&self, c: Channel) -> Option<&[f32]> {
        let idx = self.fingerprint.channels.index_of(c)?;
        let w = self.width();
        Some(&self.data[idx * w..(idx + 1) * w])
    }

    /// Sample at absolute column `x`; `0.0` outside the row or for a missing channel.
    pub fn sample(&self, c: Channel, x: i32) -> f32 {
        if !self.fingerprint.x_range.contains(x) {
            return 0.0;
        }
        self.channel(c)
            .map(|plane| plane[(x - self.fingerprint.x_range.x) as usize])
            .unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>() + std::mem::size_of::<Self>()
    }
}

/// A pin on a cached row.
///
/// While any `RowPin` for a row is alive the cache will not evict it. Dropping the pin only makes
/// the entry eligible for eviction again; memory is reclaimed by the cache's eviction pass.
/// Cloning takes an additional pin.
pub struct RowPin {
    row: Arc<Row>,
    cache: Arc<CacheShared>,
    registered: bool,
}

impl RowPin {
    pub(crate) fn new(row: Arc<Row>, cache: Arc<CacheShared>, registered: bool) -> Self {
        Self {
            row,
            cache,
            registered,
        }
    }

    /// Shared handle to the row data (does not hold a pin).
    pub fn row(&self) -> &Arc<Row> {
        &self.row
    }

    pub fn same_row(&self, other: &RowPin) -> bool {
        Arc::ptr_eq(&self.row, &other.row)
    }
}

impl Deref for RowPin {
    type Target = Row;

    fn deref(&self) -> &Row {
        &self.row
    }
}

impl Clone for RowPin {
    fn clone(&self) -> Self {
        let registered = self.registered && self.cache.pin_existing(&self.row);
        Self {
            row: Arc::clone(&self.row),
            cache: Arc::clone(&self.cache),
            registered,
        }
    }
}

impl Drop for RowPin {
    fn drop(&mut self) {
        if self.registered {
            self.cache.unpin(&self.row);
        }
    }
}

impl std::fmt::Debug for RowPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowPin")
            .field("fingerprint", &self.row.fingerprint)
            .field("registered", &self.registered)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/row.rs"]
mod tests;
