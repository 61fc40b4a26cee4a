use std::num::NonZeroUsize;
use std::time::Duration;

use crate::DEFAULT_CHUNK_SIZE;

/// Tuning knobs for the transfer engine.
///
/// Immutable once an engine is built; shared read-only across every
/// concurrent transfer of that engine.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Size of each file read in bytes. 0 means [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Maximum transfers in flight at once. 0 means the host's available
    /// parallelism.
    pub max_concurrency: usize,
    /// End-to-end timeout for one HTTP attempt.
    pub timeout: Duration,
    /// Extra attempts after the first failed one.
    pub retry_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: default_parallelism(),
            timeout: Duration::from_secs(30 * 60),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl TransferConfig {
    /// Replaces zero-valued fields with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if self.max_concurrency == 0 {
            self.max_concurrency = default_parallelism();
        }
        self
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
