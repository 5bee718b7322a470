//! Execution engines for resampling work
//!
//! Permutation tests are embarrassingly parallel: every permutation is an
//! independent closure over shared, read-only kernel matrices. Engines decide
//! whether those closures run on the calling thread or on a rayon pool.

use crate::Result;

/// Execution strategy used by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Run everything on the calling thread
    Sequential,
    /// Run on a rayon thread pool
    Parallel,
}

/// Engine that evaluates indexed, independent jobs
pub trait ExecutionEngine: Clone + Send + Sync {
    /// Evaluate `f(0..count)` and collect the results in index order
    fn execute_batch<F, R>(&self, count: usize, f: F) -> Vec<R>
    where
        F: Fn(usize) -> R + Sync + Send,
        R: Send;

    /// Evaluate fallible jobs, stopping at the first error in index order
    fn try_execute_batch<F, R>(&self, count: usize, f: F) -> Result<Vec<R>>
    where
        F: Fn(usize) -> Result<R> + Sync + Send,
        R: Send,
    {
        self.execute_batch(count, f).into_iter().collect()
    }

    fn strategy(&self) -> ExecutionStrategy;

    fn num_threads(&self) -> usize;
}

/// Sequential execution on the calling thread
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialEngine;

impl SequentialEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionEngine for SequentialEngine {
    fn execute_batch<F, R>(&self, count: usize, f: F) -> Vec<R>
    where
        F: Fn(usize) -> R + Sync + Send,
        R: Send,
    {
        (0..count).map(f).collect()
    }

    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Sequential
    }

    fn num_threads(&self) -> usize {
        1
    }
}

/// Parallel execution engine using Rayon
#[cfg(feature = "parallel")]
#[derive(Clone, Debug, Default)]
pub struct ParallelEngine {
    thread_pool: Option<std::sync::Arc<rayon::ThreadPool>>,
}

#[cfg(feature = "parallel")]
impl ParallelEngine {
    /// Create a new parallel engine on the global rayon pool
    pub fn new() -> Self {
        Self { thread_pool: None }
    }

    /// Create a new parallel engine with a custom thread pool
    pub fn with_thread_pool(pool: std::sync::Arc<rayon::ThreadPool>) -> Self {
        Self {
            thread_pool: Some(pool),
        }
    }

    /// Create with a specific number of threads
    pub fn with_num_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| crate::Error::Execution(format!("Failed to create thread pool: {e}")))?;

        Ok(Self {
            thread_pool: Some(std::sync::Arc::new(pool)),
        })
    }
}

#[cfg(feature = "parallel")]
impl ExecutionEngine for ParallelEngine {
    fn execute_batch<F, R>(&self, count: usize, f: F) -> Vec<R>
    where
        F: Fn(usize) -> R + Sync + Send,
        R: Send,
    {
        use rayon::prelude::*;

        if let Some(pool) = &self.thread_pool {
            pool.install(|| (0..count).into_par_iter().map(f).collect())
        } else {
            (0..count).into_par_iter().map(f).collect()
        }
    }

    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Parallel
    }

    fn num_threads(&self) -> usize {
        if let Some(pool) = &self.thread_pool {
            pool.current_num_threads()
        } else {
            rayon::current_num_threads()
        }
    }
}

/// Engine selected by the `parallel` feature
#[cfg(feature = "parallel")]
pub type DefaultEngine = ParallelEngine;

/// Engine selected by the `parallel` feature
#[cfg(not(feature = "parallel"))]
pub type DefaultEngine = SequentialEngine;
