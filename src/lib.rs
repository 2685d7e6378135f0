//! Scanflow is a scanline image-compositing engine.
//!
//! A directed acyclic graph of nodes computes image data one scanline at a time, on demand,
//! backed by a process-wide row cache that stays coherent under concurrent and overlapping
//! requests.
//!
//! # Pipeline overview
//!
//! 1. **Sort**: `Dag + output -> EvalOrder` (inputs before consumers)
//! 2. **Plan**: walk the order backwards, asking each node which region of each input it needs
//! 3. **Fetch**: one [`Interest`] per node pulls its rows through the [`RowCache`], computing
//!    misses on a bounded worker pool
//! 4. **Read**: the output node's rows come back pinned in a [`RenderOutput`]
//!
//! Cache invariants:
//!
//! - **Single-flight**: at most one computation per [`Fingerprint`] is in flight at a time.
//! - **Pinned rows are never evicted**: a [`RowPin`] keeps its row resident.
//! - **Versioned keys**: a node's version is part of every fingerprint, so edits never serve
//!   stale rows.
#![forbid(unsafe_code)]

mod cache;
mod config;
mod document;
mod engine;
mod foundation;
mod interest;
mod node;
mod ops;

#[cfg(test)]
#[path = "../tests/unit/support.rs"]
mod test_support;

pub use cache::fingerprint::{Fingerprint, FingerprintDigest};
pub use cache::row::{Row, RowPin};
pub use cache::store::{
    Begin, CacheOpts, CachePriority, CacheStats, Lookup, Probe, Reservation, RowCache,
};
pub use config::EngineConfig;
pub use document::{BuiltGraph, EdgeSpec, GraphDocument, NodeSpec, OpSpec};
pub use engine::dag::Dag;
pub use engine::driver::{Demand, Engine, EvalOrder};
pub use engine::output::{RenderOutput, RenderStats};
pub use foundation::core::{Channel, ChannelSet, FrameTime, NodeId, Region, XRange};
pub use foundation::error::{EngineError, EngineResult, RowError, RowFailure};
pub use interest::coordinator::{
    Interest, InterestEvent, InterestPhase, InterestStats, RowRequest,
};
pub use interest::pool::{WorkerOpts, WorkerPool};
pub use node::context::RowContext;
pub use node::instance::NodeInstance;
pub use node::{Node, VersionStamp, planar_buffer};
pub use ops::blur::{BoxBlur, MAX_BLUR_RADIUS};
pub use ops::color::{Grade, GradeParams, Invert};
pub use ops::merge::{MERGE_A, MERGE_B, Merge};
pub use ops::source::{Axis, Checkerboard, Constant, Ramp};
pub use ops::{Prioritized, Rgba};
