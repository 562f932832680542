use super::error::{EngineError, ValidationError};
use std::sync::OnceLock;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Whether more than one worker can actually run at the same time.
///
/// False when the crate is built without the `parallel` feature or the host
/// exposes a single hardware thread.
pub fn parallel_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        cfg!(feature = "parallel")
            && std::thread::available_parallelism()
                .map(|n| n.get() > 1)
                .unwrap_or(false)
    })
}

/// A bounded set of workers for independent per-dataset or per-well jobs.
///
/// With one job, or when parallelism is unavailable, every call runs on the
/// calling thread. Results always come back in input order.
pub struct WorkerPool {
    n_jobs: usize,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    pub fn new(n_jobs: usize) -> Result<Self, EngineError> {
        if n_jobs == 0 {
            return Err(ValidationError::InvalidJobs.into());
        }

        #[cfg(feature = "parallel")]
        let pool = if n_jobs > 1 && parallel_available() {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n_jobs)
                    .thread_name(|i| format!("meltscan-worker-{}", i))
                    .build()
                    .map_err(|e| EngineError::WorkerPool(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            n_jobs,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    pub fn sequential() -> Self {
        Self {
            n_jobs: 1,
            #[cfg(feature = "parallel")]
            pool: None,
        }
    }

    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    #[cfg(feature = "parallel")]
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    #[cfg(not(feature = "parallel"))]
    pub fn is_parallel(&self) -> bool {
        false
    }

    /// Applies `f` to every item, preserving order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            if let Some(pool) = &self.pool {
                return pool.install(|| items.par_iter().map(&f).collect());
            }
        }
        items.iter().map(f).collect()
    }

    /// Runs a single job inside the pool.
    pub fn run<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        #[cfg(feature = "parallel")]
        {
            if let Some(pool) = &self.pool {
                return pool.install(f);
            }
        }
        f()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("n_jobs", &self.n_jobs)
            .field("parallel", &self.is_parallel())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jobs_is_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(EngineError::Validation(ValidationError::InvalidJobs))
        ));
    }

    #[test]
    fn single_job_runs_sequentially() {
        let pool = WorkerPool::new(1).unwrap();
        assert!(!pool.is_parallel());
        assert_eq!(pool.n_jobs(), 1);
    }

    #[test]
    fn map_preserves_order_for_any_job_count() {
        let items: Vec<u64> = (0..500).collect();
        let expected: Vec<u64> = items.iter().map(|x| x * x).collect();
        for n_jobs in [1, 2, 4] {
            let pool = WorkerPool::new(n_jobs).unwrap();
            assert_eq!(pool.map(&items, |x| x * x), expected);
        }
    }

    #[test]
    fn run_returns_the_job_result() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.run(|| 6 * 7), 42);
    }

    #[test]
    fn parallel_availability_is_stable() {
        assert_eq!(parallel_available(), parallel_available());
        if !parallel_available() {
            assert!(!WorkerPool::new(8).unwrap().is_parallel());
        }
    }
}
