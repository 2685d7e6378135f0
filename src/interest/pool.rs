use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::error::{EngineError, EngineResult};

/// Worker pool configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WorkerOpts {
    /// Worker thread count. `None` uses rayon defaults.
    pub threads: Option<usize>,
}

/// Bounded pool that runs row computations.
///
/// Cloning yields another handle to the same threads.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
    spawned: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(opts: WorkerOpts) -> EngineResult<Self> {
        if let Some(n) = opts.threads
            && n == 0
        {
            return Err(EngineError::validation(
                "worker 'threads' must be >= 1 when set",
            ));
        }

        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("scanflow-worker-{i}"));
        if let Some(n) = opts.threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| {
                EngineError::evaluation(format!("failed to build rayon thread pool: {e}"))
            })?;
        Ok(Self {
            pool: Arc::new(pool),
            spawned: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// `true` when called from one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        self.pool.current_thread_index().is_some()
    }

    /// Total tasks handed to the pool since creation.
    pub fn tasks_spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    pub(crate) fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.pool.spawn(task);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .field("spawned", &self.tasks_spawned())
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/interest/pool.rs"]
mod tests;
