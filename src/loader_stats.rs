use crate::batch::FlushReason;

/// Counters describing how well a loader coalesces requests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoaderStats {
    /// Human readable name used to identify these stats when they are reported.
    pub tag: &'static str,
    /// Number of keys registered through `load_thunk` (not necessarily unique).
    pub load_requests: u64,
    /// The number of keys that were immediately found in the loader cache.
    pub cache_hits: u64,
    /// Number of batches closed because their window elapsed.
    pub window_flushes: u64,
    /// Number of batches closed because they reached `max_batch`.
    pub size_flushes: u64,
    /// Total number of unique keys handed to the batch function.
    pub keys_fetched: u64,
    /// The average number of unique keys per dispatched batch.
    pub average_batch_size: f32,
    /// The max number of unique keys dispatched in a single batch.
    pub max_batch_size: usize,
}

impl LoaderStats {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, ..Default::default() }
    }

    /// Number of times the batch function was invoked.
    pub fn batches(&self) -> u64 {
        self.window_flushes + self.size_flushes
    }

    pub(crate) fn record_load_request(&mut self) {
        self.load_requests += 1;
    }

    pub(crate) fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub(crate) fn record_dispatch(&mut self, batch_size: usize, reason: FlushReason) {
        let previous = self.batches();
        match reason {
            FlushReason::Window => self.window_flushes += 1,
            FlushReason::Size => self.size_flushes += 1,
        }
        self.average_batch_size = (((self.average_batch_size as f64 * previous as f64)
            + batch_size as f64)
            / self.batches() as f64) as f32;
        self.keys_fetched += batch_size as u64;
        if batch_size > self.max_batch_size {
            self.max_batch_size = batch_size;
        }
    }
}
