use std::fmt;
use std::sync::Arc;

use crate::foundation::core::NodeId;

/// Convenience result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Row-level computation failures are not reported through this type once they cross the worker
/// boundary; they become a [`RowFailure`] recorded on the owning scanline.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Invalid input supplied by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// Structural problem in the node graph (cycle, unknown node, bad slot).
    #[error("graph error: {0}")]
    Graph(String),

    /// A node failed while producing pixels.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Configuration could not be read or is inconsistent.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Failure to compute one scanline of one node.
///
/// Cheap to clone: every waiter on the failed fingerprint receives a copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowFailure {
    /// Node that failed.
    pub node: NodeId,
    /// Scanline being computed.
    pub y: i32,
    /// Human-readable reason.
    pub message: Arc<str>,
}

impl RowFailure {
    pub fn new(node: NodeId, y: i32, message: impl Into<String>) -> Self {
        Self {
            node,
            y,
            message: Arc::from(message.into()),
        }
    }
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} of node {} failed: {}",
            self.y, self.node.0, self.message
        )
    }
}

impl std::error::Error for RowFailure {}

/// Why [`Interest::at`](crate::Interest::at) could not hand out a row.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// The scanline was computed but its node failed.
    #[error(transparent)]
    Failed(#[from] RowFailure),

    /// The scanline is outside the interest's range.
    #[error("scanline {y} is outside the requested range")]
    OutOfRange {
        /// Requested scanline.
        y: i32,
    },

    /// The scanline has not completed yet (caller did not wait for completion).
    #[error("scanline {y} read before its completion was observed")]
    NotReady {
        /// Requested scanline.
        y: i32,
    },
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
