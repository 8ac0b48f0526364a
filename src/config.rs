use std::time::Duration;

/// Window used by [`LoaderConfig::default`].
pub const DEFAULT_WAIT: Duration = Duration::from_millis(16);

/// Controls when a [`Loader`](crate::Loader) closes its pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How long a batch accumulates keys before it is dispatched. A zero window dispatches at the
    /// next scheduling opportunity.
    pub wait: Duration,
    /// Maximum number of distinct keys per batch. `0` means unbounded.
    pub max_batch: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { wait: DEFAULT_WAIT, max_batch: 0 }
    }
}

impl LoaderConfig {
    pub fn new(wait: Duration) -> Self {
        Self { wait, ..Default::default() }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Returns true once a batch holding `len` keys must be dispatched without waiting for its
    /// window.
    pub(crate) fn is_full(&self, len: usize) -> bool {
        self.max_batch != 0 && len >= self.max_batch
    }
}
