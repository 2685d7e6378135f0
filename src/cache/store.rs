use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::cache::fingerprint::Fingerprint;
use crate::cache::row::{Row, RowPin};
use crate::foundation::error::{EngineError, EngineResult, RowFailure};

/// Eviction-priority hint attached to a row by its producing node.
///
/// Unpinned entries are evicted lowest priority first, then least recently used. `Transient`
/// rows are swept on every eviction pass once nobody pins them.
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
#[serde(rename_all = "snake_case")]
pub enum CachePriority {
    Transient,
    Low,
    #[default]
    Normal,
    High,
}

/// Row cache configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheOpts {
    /// Soft memory budget in bytes. Pinned rows may push the cache past it.
    pub budget_bytes: usize,
}

impl Default for CacheOpts {
    fn default() -> Self {
        Self {
            budget_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Completed rows currently stored.
    pub entries: usize,
    /// Computations reserved or running.
    pub in_flight: usize,
    /// Completed rows with at least one pin.
    pub pinned_entries: usize,
    /// Bytes held by completed rows.
    pub bytes: usize,
    /// Lookups answered from a completed row.
    pub hits: u64,
    /// Lookups that reserved a new computation.
    pub misses: u64,
    /// Lookups that blocked on a running computation.
    pub waits: u64,
    /// Pending reservations taken over by another caller.
    pub takeovers: u64,
    /// Successful publishes.
    pub computations: u64,
    /// Failed publishes.
    pub failures: u64,
    /// Rows removed by eviction.
    pub evictions: u64,
    /// Eviction passes that ended over budget because only pinned rows were left.
    pub over_budget_events: u64,
}

/// Result of [`RowCache::lookup_or_reserve`].
#[derive(Debug)]
pub enum Lookup {
    /// A completed row, pinned for the caller.
    Hit(RowPin),
    /// The caller now owns the duty to compute the row and [`publish`](RowCache::publish) it.
    Reserved(Reservation),
}

/// Result of [`RowCache::probe`].
#[derive(Debug)]
pub enum Probe {
    /// A completed row, pinned for the caller.
    Hit(RowPin),
    /// A new pending reservation owned by the caller.
    Reserved(Reservation),
    /// Someone else has the fingerprint in flight.
    Busy,
}

/// Outcome of [`RowCache::begin`] on a reservation.
#[derive(Debug)]
pub enum Begin {
    /// The caller runs the computation.
    Run(Reservation),
    /// Someone else ran it; this is their result.
    Joined(Result<RowPin, RowFailure>),
}

/// Exclusive right (and duty) to compute one fingerprint.
///
/// A reservation is *pending* until [`RowCache::begin`] starts it. Pending reservations can be
/// taken over by any other caller asking for the same fingerprint, so nobody ever blocks on work
/// that is merely queued. Dropping a reservation without publishing fails the fingerprint so
/// waiters wake up.
pub struct Reservation {
    fingerprint: Fingerprint,
    flight: Arc<Flight>,
    cache: Arc<CacheShared>,
    running: bool,
    resolved: bool,
}

impl Reservation {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.resolved {
            self.resolved = true;
            self.cache.abandon(&self.flight, self.fingerprint, self.running);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("fingerprint", &self.fingerprint)
            .field("ticket", &self.flight.ticket)
            .field("running", &self.running)
            .finish()
    }
}

/// Process-wide store of computed rows.
///
/// Cloning yields another handle to the same cache. All mutation (reservation, publish, pinning,
/// eviction) happens under one lock; row buffers are immutable once published.
#[derive(Clone)]
pub struct RowCache {
    shared: Arc<CacheShared>,
}

impl Default for RowCache {
    fn default() -> Self {
        Self::new(CacheOpts::default())
    }
}

impl RowCache {
    pub fn new(opts: CacheOpts) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    budget: opts.budget_bytes,
                    bytes: 0,
                    tick: 0,
                    next_ticket: 0,
                    unpinned_transient: 0,
                    counters: CacheStats::default(),
                }),
            }),
        }
    }

    /// Return the completed row for `fp`, or reserve its computation.
    ///
    /// If another caller is already running the computation this blocks until it is published and
    /// then returns its row (or its failure). A pending (queued, not yet started) reservation is
    /// taken over instead: the caller receives a running [`Reservation`] and the original holder
    /// joins the result when it gets to [`begin`](Self::begin).
    pub fn lookup_or_reserve(
        &self,
        fp: Fingerprint,
        priority: CachePriority,
    ) -> Result<Lookup, RowFailure> {
        let flight = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            st.tick += 1;
            let tick = st.tick;
            match st.entries.get_mut(&fp) {
                Some(Entry::Ready(ready)) => {
                    if ready.pins == 0 && ready.priority == CachePriority::Transient {
                        st.unpinned_transient -= 1;
                    }
                    ready.pins += 1;
                    ready.last_used = tick;
                    st.counters.hits += 1;
                    let row = Arc::clone(&ready.row);
                    return Ok(Lookup::Hit(RowPin::new(
                        row,
                        Arc::clone(&self.shared),
                        true,
                    )));
                }
                Some(Entry::InFlight(inflight)) if !inflight.started => {
                    inflight.started = true;
                    st.counters.takeovers += 1;
                    tracing::debug!(digest = %fp.digest(), y = fp.y, "took over pending row");
                    return Ok(Lookup::Reserved(Reservation {
                        fingerprint: fp,
                        flight: Arc::clone(&inflight.flight),
                        cache: Arc::clone(&self.shared),
                        running: true,
                        resolved: false,
                    }));
                }
                Some(Entry::InFlight(inflight)) => {
                    inflight.waiters += 1;
                    st.counters.waits += 1;
                    Arc::clone(&inflight.flight)
                }
                None => {
                    st.counters.misses += 1;
                    st.next_ticket += 1;
                    let flight = Arc::new(Flight::new(st.next_ticket, priority));
                    st.entries.insert(
                        fp,
                        Entry::InFlight(InFlight {
                            flight: Arc::clone(&flight),
                            started: false,
                            waiters: 0,
                        }),
                    );
                    tracing::debug!(digest = %fp.digest(), y = fp.y, "reserved row");
                    return Ok(Lookup::Reserved(Reservation {
                        fingerprint: fp,
                        flight,
                        cache: Arc::clone(&self.shared),
                        running: false,
                        resolved: false,
                    }));
                }
            }
        };

        // Registered as a waiter: the publisher pins the row on our behalf.
        flight
            .wait()
            .map(|row| Lookup::Hit(RowPin::new(row, Arc::clone(&self.shared), true)))
    }

    /// Non-blocking variant of [`lookup_or_reserve`](Self::lookup_or_reserve).
    ///
    /// Never waits and never takes over someone else's reservation; an in-flight fingerprint is
    /// reported as [`Probe::Busy`].
    pub fn probe(&self, fp: Fingerprint, priority: CachePriority) -> Probe {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.tick += 1;
        let tick = st.tick;
        match st.entries.get_mut(&fp) {
            Some(Entry::Ready(ready)) => {
                if ready.pins == 0 && ready.priority == CachePriority::Transient {
                    st.unpinned_transient -= 1;
                }
                ready.pins += 1;
                ready.last_used = tick;
                st.counters.hits += 1;
                Probe::Hit(RowPin::new(
                    Arc::clone(&ready.row),
                    Arc::clone(&self.shared),
                    true,
                ))
            }
            Some(Entry::InFlight(_)) => Probe::Busy,
            None => {
                st.counters.misses += 1;
                st.next_ticket += 1;
                let flight = Arc::new(Flight::new(st.next_ticket, priority));
                st.entries.insert(
                    fp,
                    Entry::InFlight(InFlight {
                        flight: Arc::clone(&flight),
                        started: false,
                        waiters: 0,
                    }),
                );
                tracing::debug!(digest = %fp.digest(), y = fp.y, "reserved row");
                Probe::Reserved(Reservation {
                    fingerprint: fp,
                    flight,
                    cache: Arc::clone(&self.shared),
                    running: false,
                    resolved: false,
                })
            }
        }
    }

    /// Non-blocking lookup of a completed row.
    pub fn try_get(&self, fp: &Fingerprint) -> Option<RowPin> {
        let mut guard = self.shared.state.lock();
        let st = &mut *guard;
        st.tick += 1;
        let tick = st.tick;
        let Some(Entry::Ready(ready)) = st.entries.get_mut(fp) else {
            return None;
        };
        if ready.pins == 0 && ready.priority == CachePriority::Transient {
            st.unpinned_transient -= 1;
        }
        ready.pins += 1;
        ready.last_used = tick;
        st.counters.hits += 1;
        Some(RowPin::new(
            Arc::clone(&ready.row),
            Arc::clone(&self.shared),
            true,
        ))
    }

    /// Start a reservation.
    ///
    /// Returns [`Begin::Run`] if the caller should compute the row now, or the published result if
    /// the reservation was taken over in the meantime.
    pub fn begin(&self, mut reservation: Reservation) -> Begin {
        if reservation.running {
            return Begin::Run(reservation);
        }

        let registered = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            match st.entries.get_mut(&reservation.fingerprint) {
                Some(Entry::InFlight(inflight))
                    if inflight.flight.ticket == reservation.flight.ticket =>
                {
                    if !inflight.started {
                        inflight.started = true;
                        reservation.running = true;
                        return Begin::Run(reservation);
                    }
                    inflight.waiters += 1;
                    st.counters.waits += 1;
                    true
                }
                // Already published by whoever took it over.
                _ => false,
            }
        };

        reservation.resolved = true;
        let flight = Arc::clone(&reservation.flight);
        drop(reservation);

        let outcome = flight.wait().map(|row| {
            if registered {
                RowPin::new(row, Arc::clone(&self.shared), true)
            } else {
                self.shared.pin_or_adopt(row)
            }
        });
        Begin::Joined(outcome)
    }

    /// Store the outcome of a running reservation and wake everyone waiting on it.
    ///
    /// On success the row is returned pinned for the publisher. A failure is handed to all waiters
    /// and the fingerprint is forgotten, so a later request retries the computation.
    pub fn publish(
        &self,
        mut reservation: Reservation,
        result: Result<Vec<f32>, RowFailure>,
    ) -> Result<RowPin, RowFailure> {
        debug_assert!(
            reservation.running,
            "publish on a reservation that never began"
        );
        let fp = reservation.fingerprint;
        let priority = reservation.flight.priority;
        let outcome = result
            .and_then(|data| Row::from_buffer(fp, priority, data))
            .map(Arc::new);
        reservation.resolved = true;
        self.shared.complete(&reservation.flight, fp, outcome)
    }

    /// Pin a row obtained earlier, re-inserting it if it was evicted meanwhile.
    ///
    /// A re-inserted row keeps the priority it was computed with.
    pub fn pin(&self, row: &Arc<Row>) -> RowPin {
        self.shared.pin_or_adopt(Arc::clone(row))
    }

    /// Release a pin. Equivalent to dropping it; memory is only reclaimed by eviction.
    pub fn unpin(&self, pin: RowPin) {
        drop(pin);
    }

    /// Evict unpinned rows until the cache fits its budget. Returns the number of rows evicted.
    pub fn evict_if_needed(&self) -> usize {
        let mut guard = self.shared.state.lock();
        guard.evict()
    }

    /// Drop every unpinned row regardless of budget.
    pub fn purge_unpinned(&self) -> usize {
        let mut guard = self.shared.state.lock();
        let budget = guard.budget;
        guard.budget = 0;
        let evicted = guard.evict_quiet();
        guard.budget = budget;
        evicted
    }

    /// Change the memory budget and evict down to it.
    pub fn set_budget(&self, budget_bytes: usize) -> EngineResult<usize> {
        if budget_bytes == 0 {
            return Err(EngineError::validation("cache budget must be > 0 bytes"));
        }
        let mut guard = self.shared.state.lock();
        guard.budget = budget_bytes;
        Ok(guard.evict())
    }

    pub fn budget(&self) -> usize {
        self.shared.state.lock().budget
    }

    /// `true` if a completed row is stored for `fp`.
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        matches!(
            self.shared.state.lock().entries.get(fp),
            Some(Entry::Ready(_))
        )
    }

    /// Pin count of a completed row, `None` if not stored.
    pub fn pin_count(&self, fp: &Fingerprint) -> Option<usize> {
        match self.shared.state.lock().entries.get(fp) {
            Some(Entry::Ready(ready)) => Some(ready.pins),
            _ => None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.shared.state.lock();
        let mut stats = guard.counters;
        stats.bytes = guard.bytes;
        for entry in guard.entries.values() {
            match entry {
                Entry::Ready(ready) => {
                    stats.entries += 1;
                    if ready.pins > 0 {
                        stats.pinned_entries += 1;
                    }
                }
                Entry::InFlight(_) => stats.in_flight += 1,
            }
        }
        stats
    }
}

pub(crate) struct CacheShared {
    state: Mutex<CacheState>,
}

impl CacheShared {
    fn complete(
        self: &Arc<Self>,
        flight: &Arc<Flight>,
        fp: Fingerprint,
        outcome: Result<Arc<Row>, RowFailure>,
    ) -> Result<RowPin, RowFailure> {
        let owns_entry = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let waiters = match st.entries.get(&fp) {
                Some(Entry::InFlight(inflight)) if inflight.flight.ticket == flight.ticket => {
                    Some(inflight.waiters)
                }
                _ => None,
            };
            match (&outcome, waiters) {
                (Ok(row), Some(waiters)) => {
                    st.tick += 1;
                    st.bytes += row.byte_len();
                    st.counters.computations += 1;
                    st.entries.insert(
                        fp,
                        Entry::Ready(Ready {
                            row: Arc::clone(row),
                            pins: 1 + waiters,
                            last_used: st.tick,
                            priority: flight.priority,
                        }),
                    );
                    tracing::debug!(digest = %fp.digest(), y = fp.y, waiters, "published row");
                    st.evict();
                }
                (Err(failure), Some(_)) => {
                    st.entries.remove(&fp);
                    st.counters.failures += 1;
                    tracing::warn!(digest = %fp.digest(), %failure, "row computation failed");
                }
                (_, None) => {
                    tracing::warn!(
                        digest = %fp.digest(),
                        "publish for a reservation the cache no longer tracks"
                    );
                }
            }
            waiters.is_some()
        };

        flight.resolve(outcome.clone());
        let row = outcome?;
        if owns_entry {
            Ok(RowPin::new(row, Arc::clone(self), true))
        } else {
            Ok(self.pin_or_adopt(row))
        }
    }

    fn abandon(self: &Arc<Self>, flight: &Arc<Flight>, fp: Fingerprint, running: bool) {
        if !running {
            let guard = self.state.lock();
            match guard.entries.get(&fp) {
                Some(Entry::InFlight(inflight))
                    if inflight.flight.ticket == flight.ticket && !inflight.started => {}
                // Taken over or already published: the new owner is responsible.
                _ => return,
            }
        }
        let failure = RowFailure::new(fp.node, fp.y, "computation abandoned before publish");
        let _ = self.complete(flight, fp, Err(failure));
    }

    fn pin_or_adopt(self: &Arc<Self>, row: Arc<Row>) -> RowPin {
        let fp = *row.fingerprint();
        let registered = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.tick += 1;
            let tick = st.tick;
            match st.entries.get_mut(&fp) {
                Some(Entry::Ready(ready)) if Arc::ptr_eq(&ready.row, &row) => {
                    if ready.pins == 0 && ready.priority == CachePriority::Transient {
                        st.unpinned_transient -= 1;
                    }
                    ready.pins += 1;
                    ready.last_used = tick;
                    true
                }
                None => {
                    st.bytes += row.byte_len();
                    st.entries.insert(
                        fp,
                        Entry::Ready(Ready {
                            row: Arc::clone(&row),
                            pins: 1,
                            last_used: tick,
                            priority: row.priority(),
                        }),
                    );
                    true
                }
                // A newer copy or a recomputation owns the slot; keep the data alive unpinned.
                Some(_) => false,
            }
        };
        RowPin::new(row, Arc::clone(self), registered)
    }

    pub(crate) fn pin_existing(&self, row: &Arc<Row>) -> bool {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        match st.entries.get_mut(row.fingerprint()) {
            Some(Entry::Ready(ready)) if Arc::ptr_eq(&ready.row, row) => {
                if ready.pins == 0 && ready.priority == CachePriority::Transient {
                    st.unpinned_transient -= 1;
                }
                ready.pins += 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn unpin(&self, row: &Arc<Row>) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        if let Some(Entry::Ready(ready)) = st.entries.get_mut(row.fingerprint())
            && Arc::ptr_eq(&ready.row, row)
        {
            debug_assert!(ready.pins > 0, "unpin without a matching pin");
            ready.pins = ready.pins.saturating_sub(1);
            if ready.pins == 0 && ready.priority == CachePriority::Transient {
                st.unpinned_transient += 1;
            }
        }
    }
}

struct CacheState {
    entries: HashMap<Fingerprint, Entry>,
    budget: usize,
    bytes: usize,
    tick: u64,
    next_ticket: u64,
    unpinned_transient: usize,
    counters: CacheStats,
}

impl CacheState {
    fn evict(&mut self) -> usize {
        if self.bytes <= self.budget && self.unpinned_transient == 0 {
            return 0;
        }
        let evicted = self.evict_quiet();
        if self.bytes > self.budget {
            self.counters.over_budget_events += 1;
            tracing::warn!(
                bytes = self.bytes,
                budget = self.budget,
                "row cache over budget; remaining rows are pinned"
            );
        }
        evicted
    }

    fn evict_quiet(&mut self) -> usize {
        let mut candidates = self
            .entries
            .iter()
            .filter_map(|(fp, entry)| match entry {
                Entry::Ready(ready) if ready.pins == 0 => {
                    Some((ready.priority, ready.last_used, *fp))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        candidates.sort_unstable_by_key(|(priority, last_used, _)| (*priority, *last_used));

        let mut evicted = 0usize;
        for (priority, _, fp) in candidates {
            if priority != CachePriority::Transient && self.bytes <= self.budget {
                break;
            }
            if let Some(Entry::Ready(ready)) = self.entries.remove(&fp) {
                self.bytes = self.bytes.saturating_sub(ready.row.byte_len());
                if ready.priority == CachePriority::Transient {
                    self.unpinned_transient -= 1;
                }
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.counters.evictions += evicted as u64;
            tracing::debug!(evicted, bytes = self.bytes, "evicted unpinned rows");
        }
        evicted
    }
}

enum Entry {
    Ready(Ready),
    InFlight(InFlight),
}

struct Ready {
    row: Arc<Row>,
    pins: usize,
    last_used: u64,
    priority: CachePriority,
}

struct InFlight {
    flight: Arc<Flight>,
    started: bool,
    waiters: usize,
}

/// Rendezvous for everyone interested in one computation.
struct Flight {
    ticket: u64,
    priority: CachePriority,
    outcome: Mutex<Option<Result<Arc<Row>, RowFailure>>>,
    done: Condvar,
}

impl Flight {
    fn new(ticket: u64, priority: CachePriority) -> Self {
        Self {
            ticket,
            priority,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<Arc<Row>, RowFailure> {
        let mut guard = self.outcome.lock();
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut guard);
        }
    }

    fn resolve(&self, outcome: Result<Arc<Row>, RowFailure>) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
