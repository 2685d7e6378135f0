use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::cache::fingerprint::Fingerprint;
use crate::cache::row::RowPin;
use crate::cache::store::{Begin, Lookup, RowCache};
use crate::foundation::core::{ChannelSet, FrameTime, NodeId, XRange};
use crate::foundation::error::{EngineError, EngineResult, RowFailure};
use crate::interest::coordinator::{Interest, RowRequest};
use crate::interest::pool::WorkerPool;
use crate::node::instance::NodeInstance;

/// Services available to a node while it computes one row.
///
/// Upstream reads go through the shared cache, so they are single-flight with every other
/// consumer and usually hit rows the engine already prefetched.
pub struct RowContext<'a> {
    cache: &'a RowCache,
    pool: &'a WorkerPool,
    instance: &'a NodeInstance,
    time: FrameTime,
}

impl<'a> RowContext<'a> {
    pub(crate) fn new(
        cache: &'a RowCache,
        pool: &'a WorkerPool,
        instance: &'a NodeInstance,
        time: FrameTime,
    ) -> Self {
        Self {
            cache,
            pool,
            instance,
            time,
        }
    }

    pub fn time(&self) -> FrameTime {
        self.time
    }

    pub fn node_id(&self) -> NodeId {
        self.instance.id()
    }

    /// `true` if input `slot` is wired.
    pub fn has_input(&self, slot: usize) -> bool {
        self.instance.input(slot).is_some()
    }

    /// Fetch one upstream row, computing it on this thread if nobody has it in flight.
    ///
    /// The returned row covers at least `x_range` and `channels`; read it by absolute x and by
    /// channel, not by offset.
    pub fn input_row(
        &self,
        slot: usize,
        y: i32,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<RowPin> {
        let input = self.connected(slot)?;
        let (x_range, channels) = input.widen(y, y, x_range, channels);
        let version = input.effective_version();
        let fp = input.fingerprint(version, y, self.time, x_range, channels);
        fetch_row(self.cache, self.pool, input, fp)
            .map_err(|failure| EngineError::evaluation(failure.to_string()))
    }

    /// Open (unclaimed) an interest over scanlines `[y_start, y_end]` of an input.
    ///
    /// Like [`input_row`](RowContext::input_row), the rows may be wider than asked for.
    pub fn input_interest(
        &self,
        slot: usize,
        y_start: i32,
        y_end: i32,
        x_range: XRange,
        channels: ChannelSet,
    ) -> EngineResult<Interest> {
        let input = self.connected(slot)?;
        let (x_range, channels) = input.widen(y_start, y_end, x_range, channels);
        let request = RowRequest::new(y_start, y_end, x_range, self.time, channels)?;
        Ok(Interest::new(
            Arc::clone(input),
            request,
            self.cache,
            self.pool,
        ))
    }

    fn connected(&self, slot: usize) -> EngineResult<&'a Arc<NodeInstance>> {
        self.instance.input(slot).ok_or_else(|| {
            EngineError::graph(format!(
                "input {slot} of node '{}' is not connected",
                self.instance.name()
            ))
        })
    }
}

/// Blocking single-flight fetch: hit, or take over / reserve and compute inline, or wait.
pub(crate) fn fetch_row(
    cache: &RowCache,
    pool: &WorkerPool,
    instance: &NodeInstance,
    fp: Fingerprint,
) -> Result<RowPin, RowFailure> {
    match cache.lookup_or_reserve(fp, instance.node().cache_priority())? {
        Lookup::Hit(pin) => Ok(pin),
        Lookup::Reserved(reservation) => match cache.begin(reservation) {
            Begin::Run(reservation) => {
                let data = compute_row(cache, pool, instance, &fp);
                cache.publish(reservation, data)
            }
            Begin::Joined(outcome) => outcome,
        },
    }
}

/// Run the node for one fingerprint. Errors and panics become a [`RowFailure`].
pub(crate) fn compute_row(
    cache: &RowCache,
    pool: &WorkerPool,
    instance: &NodeInstance,
    fp: &Fingerprint,
) -> Result<Vec<f32>, RowFailure> {
    let ctx = RowContext::new(cache, pool, instance, fp.time);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        instance
            .node()
            .get(&ctx, fp.y, fp.time, fp.x_range, fp.channels)
    }));
    match result {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(err)) => Err(RowFailure::new(fp.node, fp.y, err.to_string())),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "node panicked".to_string());
            Err(RowFailure::new(fp.node, fp.y, format!("panic: {msg}")))
        }
    }
}
