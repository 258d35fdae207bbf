//! Document-level parallelism settings.

use serde::{Deserialize, Serialize};

/// Controls how independent documents are fanned out over rayon.
///
/// The reconstruction of a single document is always sequential; only
/// whole documents run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelPolicy {
    /// Maximum number of threads to use.
    /// If None, rayon uses its default pool size (typically the number of CPU cores).
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Batches with at most this many documents run sequentially.
    /// Default: 1
    #[serde(default = "ParallelPolicy::default_document_threshold")]
    pub document_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the sequential threshold.
    pub fn with_document_threshold(mut self, threshold: usize) -> Self {
        self.document_threshold = threshold;
        self
    }

    /// Whether a batch of `count` documents should run in parallel.
    pub fn should_parallelize(&self, count: usize) -> bool {
        count > self.document_threshold && self.max_threads != Some(1)
    }

    /// Install the global rayon thread pool with the configured number of threads.
    ///
    /// Call once at startup, before any documents are processed.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the thread pool was configured
    /// - `Ok(false)` if `max_threads` is None
    /// - `Err` if the global pool was already initialized
    pub fn install_global_thread_pool(&self) -> Result<bool, rayon::ThreadPoolBuildError> {
        if let Some(num_threads) = self.max_threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn default_document_threshold() -> usize {
        1
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            document_threshold: Self::default_document_threshold(),
        }
    }
}
