use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};

use crate::cache::fingerprint::Fingerprint;
use crate::cache::row::RowPin;
use crate::cache::store::{Begin, Probe, RowCache};
use crate::foundation::core::{ChannelSet, FrameTime, Region, XRange};
use crate::foundation::error::{EngineError, EngineResult, RowError, RowFailure};
use crate::interest::pool::WorkerPool;
use crate::node::context::{compute_row, fetch_row};
use crate::node::instance::NodeInstance;

/// Block of scanlines `[y_start, y_end]` (inclusive) wanted from one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowRequest {
    pub y_start: i32,
    pub y_end: i32,
    pub x_range: XRange,
    pub time: FrameTime,
    pub channels: ChannelSet,
}

impl RowRequest {
    pub fn new(
        y_start: i32,
        y_end: i32,
        x_range: XRange,
        time: FrameTime,
        channels: ChannelSet,
    ) -> EngineResult<Self> {
        if y_start > y_end {
            return Err(EngineError::validation(
                "interest range requires y_start <= y_end",
            ));
        }
        Ok(Self {
            y_start,
            y_end,
            x_range,
            time,
            channels,
        })
    }

    /// Request covering a non-empty region.
    pub fn from_region(
        region: Region,
        time: FrameTime,
        channels: ChannelSet,
    ) -> EngineResult<Self> {
        let (y_start, y_end) = region
            .rows()
            .ok_or_else(|| EngineError::validation("interest region must be non-empty"))?;
        Self::new(y_start, y_end, region.x_range(), time, channels)
    }

    /// Number of scanlines requested (always at least one).
    pub fn row_count(&self) -> usize {
        (self.y_end - self.y_start) as usize + 1
    }

    pub fn contains(&self, y: i32) -> bool {
        self.y_start <= y && y <= self.y_end
    }
}

/// Lifecycle of an [`Interest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterestPhase {
    /// Constructed, no work started.
    Unclaimed,
    /// Rows are being looked up or computed.
    Fetching,
    /// Every scanline has an outcome. Terminal.
    Finished,
}

/// Completion notification delivered to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterestEvent {
    /// Scanline `y` has an outcome; `ok` is `false` if its computation failed.
    RowFinished { y: i32, ok: bool },
    /// Every scanline has an outcome. Sent exactly once.
    Finished,
}

/// Per-interest counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterestStats {
    /// Scanlines in the range.
    pub rows: usize,
    /// Scanlines served straight from the cache at claim time.
    pub hits: usize,
    /// Computation tasks submitted to the worker pool.
    pub scheduled: usize,
    /// Scanlines already in flight elsewhere at claim time.
    pub joined: usize,
    /// Scanlines whose computation failed.
    pub failed: usize,
}

/// Fetches and pins a vertical block of rows of one node.
///
/// Construction does no work; [`claim_interest`](Interest::claim_interest) starts it. This lets a
/// consumer [`subscribe`](Interest::subscribe) before any row can complete. Every row obtained is
/// pinned until the interest is dropped, after which the rows return to normal eviction.
///
/// Dropping an unfinished interest does not cancel computations already handed to workers; they
/// still publish into the cache.
pub struct Interest {
    node: Arc<NodeInstance>,
    request: RowRequest,
    cache: RowCache,
    pool: WorkerPool,
    shared: Arc<InterestShared>,
}

impl Interest {
    pub fn new(
        node: Arc<NodeInstance>,
        request: RowRequest,
        cache: &RowCache,
        pool: &WorkerPool,
    ) -> Self {
        let rows = request.row_count();
        let mut slots = Vec::with_capacity(rows);
        slots.resize_with(rows, || Slot::Pending);
        Self {
            node,
            request,
            cache: cache.clone(),
            pool: pool.clone(),
            shared: Arc::new(InterestShared {
                state: Mutex::new(InterestState {
                    phase: InterestPhase::Unclaimed,
                    y_start: request.y_start,
                    slots,
                    done: 0,
                    subscribers: Vec::new(),
                    released: false,
                    stats: InterestStats {
                        rows,
                        ..InterestStats::default()
                    },
                }),
                finished: Condvar::new(),
            }),
        }
    }

    pub fn node(&self) -> &Arc<NodeInstance> {
        &self.node
    }

    pub fn request(&self) -> &RowRequest {
        &self.request
    }

    /// Start fetching. Idempotent: only the first call does anything.
    ///
    /// Cached rows are recorded immediately; each missing row becomes one task on the worker pool.
    /// Never blocks on other computations.
    #[tracing::instrument(
        skip(self),
        fields(node = %self.node.name(), y0 = self.request.y_start, y1 = self.request.y_end)
    )]
    pub fn claim_interest(&self) {
        {
            let mut st = self.shared.state.lock();
            if st.phase != InterestPhase::Unclaimed {
                return;
            }
            st.phase = InterestPhase::Fetching;
        }

        let version = self.node.effective_version();
        let priority = self.node.node().cache_priority();
        let (mut hits, mut scheduled, mut joined) = (0usize, 0usize, 0usize);

        for y in self.request.y_start..=self.request.y_end {
            let fp = self.fingerprint(version, y);
            match self.cache.probe(fp, priority) {
                Probe::Hit(pin) => {
                    hits += 1;
                    self.shared.record(y, Ok(pin));
                }
                Probe::Reserved(reservation) => {
                    scheduled += 1;
                    let (cache, pool, node, shared) = self.task_handles();
                    self.pool.spawn(move || {
                        let outcome = match cache.begin(reservation) {
                            Begin::Run(reservation) => {
                                let data = compute_row(&cache, &pool, &node, &fp);
                                cache.publish(reservation, data)
                            }
                            Begin::Joined(outcome) => outcome,
                        };
                        shared.record(y, outcome);
                    });
                }
                Probe::Busy => {
                    joined += 1;
                    let (cache, pool, node, shared) = self.task_handles();
                    self.pool.spawn(move || {
                        let outcome = fetch_row(&cache, &pool, &node, fp);
                        shared.record(y, outcome);
                    });
                }
            }
        }

        let mut st = self.shared.state.lock();
        st.stats.hits = hits;
        st.stats.scheduled = scheduled;
        st.stats.joined = joined;
        tracing::debug!(hits, scheduled, joined, "interest claimed");
    }

    /// Non-blocking poll of the terminal state.
    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().phase == InterestPhase::Finished
    }

    pub fn phase(&self) -> InterestPhase {
        self.shared.state.lock().phase
    }

    /// Receive per-row and whole-range completion events.
    ///
    /// Subscribe before [`claim_interest`](Interest::claim_interest) to observe every row. A
    /// subscriber registered after completion immediately receives [`InterestEvent::Finished`].
    /// Events are sent from worker threads; the receiver can be drained on any thread.
    pub fn subscribe(&self) -> Receiver<InterestEvent> {
        let (tx, rx) = unbounded();
        let mut st = self.shared.state.lock();
        if st.phase == InterestPhase::Finished {
            let _ = tx.send(InterestEvent::Finished);
        } else {
            st.subscribers.push(tx);
        }
        rx
    }

    /// Block until every scanline has an outcome. Claims the interest first if needed.
    ///
    /// Called from a pool worker (a node reading a block of its input), the waiting thread computes
    /// still-queued rows itself instead of idling, so a bounded pool cannot starve.
    pub fn wait(&self) {
        self.claim_interest();
        if self.pool.is_worker_thread() {
            self.help();
        }
        let mut st = self.shared.state.lock();
        while st.phase != InterestPhase::Finished {
            self.shared.finished.wait(&mut st);
        }
    }

    /// Like [`wait`](Interest::wait) with a deadline. Returns `true` if finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.claim_interest();
        let deadline = std::time::Instant::now() + timeout;
        let mut st = self.shared.state.lock();
        while st.phase != InterestPhase::Finished {
            if self
                .shared
                .finished
                .wait_until(&mut st, deadline)
                .timed_out()
            {
                return st.phase == InterestPhase::Finished;
            }
        }
        true
    }

    /// Row for scanline `y`.
    ///
    /// Precondition: the scanline's completion was observed (event, [`wait`](Interest::wait) or
    /// [`is_finished`](Interest::is_finished)). Reading earlier is a caller bug: it asserts in
    /// debug builds and yields [`RowError::NotReady`] otherwise.
    pub fn at(&self, y: i32) -> Result<RowPin, RowError> {
        if !self.request.contains(y) {
            return Err(RowError::OutOfRange { y });
        }
        let st = self.shared.state.lock();
        match &st.slots[(y - self.request.y_start) as usize] {
            Slot::Ready(pin) => Ok(pin.clone()),
            Slot::Failed(failure) => Err(RowError::Failed(failure.clone())),
            Slot::Pending => {
                debug_assert!(false, "Interest::at({y}) called before the row completed");
                Err(RowError::NotReady { y })
            }
        }
    }

    /// Completed rows in scanline order; failed or pending scanlines are skipped.
    pub fn rows(&self) -> Vec<RowPin> {
        let st = self.shared.state.lock();
        st.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Ready(pin) => Some(pin.clone()),
                _ => None,
            })
            .collect()
    }

    /// Scanlines whose computation failed.
    pub fn failures(&self) -> Vec<RowFailure> {
        let st = self.shared.state.lock();
        st.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Failed(failure) => Some(failure.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn stats(&self) -> InterestStats {
        self.shared.state.lock().stats
    }

    /// Release every pin now. Same as dropping the interest.
    pub fn release(self) {
        drop(self);
    }

    fn fingerprint(&self, version: u64, y: i32) -> Fingerprint {
        self.node.fingerprint(
            version,
            y,
            self.request.time,
            self.request.x_range,
            self.request.channels,
        )
    }

    fn task_handles(&self) -> (RowCache, WorkerPool, Arc<NodeInstance>, Arc<InterestShared>) {
        (
            self.cache.clone(),
            self.pool.clone(),
            Arc::clone(&self.node),
            Arc::clone(&self.shared),
        )
    }

    fn help(&self) {
        let version = self.node.effective_version();
        for y in self.request.y_start..=self.request.y_end {
            if !self.shared.is_pending(y) {
                continue;
            }
            let fp = self.fingerprint(version, y);
            let outcome = fetch_row(&self.cache, &self.pool, &self.node, fp);
            self.shared.record(y, outcome);
        }
    }
}

impl Drop for Interest {
    fn drop(&mut self) {
        let (slots, subscribers) = {
            let mut st = self.shared.state.lock();
            st.released = true;
            (
                std::mem::take(&mut st.slots),
                std::mem::take(&mut st.subscribers),
            )
        };
        // Unpin outside the interest lock.
        drop(slots);
        drop(subscribers);
    }
}

impl std::fmt::Debug for Interest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interest")
            .field("node", &self.node.id())
            .field("request", &self.request)
            .field("phase", &self.phase())
            .finish()
    }
}

struct InterestShared {
    state: Mutex<InterestState>,
    finished: Condvar,
}

impl InterestShared {
    fn is_pending(&self, y: i32) -> bool {
        let st = self.state.lock();
        let idx = (y - st.y_start) as usize;
        matches!(st.slots.get(idx), Some(Slot::Pending))
    }

    /// Record the outcome of scanline `y`. First outcome wins; later ones are dropped.
    fn record(&self, y: i32, outcome: Result<RowPin, RowFailure>) {
        let mut st = self.state.lock();
        let idx = (y - st.y_start) as usize;
        if st.released || !matches!(st.slots.get(idx), Some(Slot::Pending)) {
            drop(st);
            drop(outcome);
            return;
        }

        let ok = outcome.is_ok();
        let slot = match outcome {
            Ok(pin) => Slot::Ready(pin),
            Err(failure) => {
                tracing::debug!(y, %failure, "scanline failed");
                st.stats.failed += 1;
                Slot::Failed(failure)
            }
        };
        st.slots[idx] = slot;
        st.done += 1;
        st.subscribers
            .retain(|tx| tx.send(InterestEvent::RowFinished { y, ok }).is_ok());

        if st.done == st.slots.len() {
            st.phase = InterestPhase::Finished;
            for tx in std::mem::take(&mut st.subscribers) {
                let _ = tx.send(InterestEvent::Finished);
            }
            self.finished.notify_all();
        }
    }
}

struct InterestState {
    phase: InterestPhase,
    y_start: i32,
    slots: Vec<Slot>,
    done: usize,
    subscribers: Vec<Sender<InterestEvent>>,
    released: bool,
    stats: InterestStats,
}

enum Slot {
    Pending,
    Ready(RowPin),
    Failed(RowFailure),
}

#[cfg(test)]
#[path = "../../tests/unit/interest/coordinator.rs"]
mod tests;
