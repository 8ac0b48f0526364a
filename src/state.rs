use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::batch::{CompletionSignal, FlushReason, PendingBatch};
use crate::cache::Cache;
use crate::config::LoaderConfig;
#[cfg(feature = "stats")]
use crate::loader_stats::LoaderStats;

/// Outcome of registering one key with the loader.
pub(crate) enum Registration<K, V, E> {
    /// The key was cached; no batch is involved.
    Cached(V),
    /// The key joined the open batch at `position`.
    Enqueued {
        position: usize,
        completion: CompletionSignal<V, E>,
        /// Set when this registration opened the batch and its window timer must be started.
        opened: Option<u64>,
        /// Set when this registration filled the batch, which is now detached and must be
        /// dispatched by the caller.
        filled: Option<PendingBatch<K, V, E>>,
    },
}

/// Mutable loader state. Always accessed under the loader's lock, and the lock is never held
/// across the batch function or a completion wait.
pub(crate) struct LoaderState<K, V, E> {
    cache: HashMap<K, V>,
    batch: Option<PendingBatch<K, V, E>>,
    next_batch_id: u64,
    #[cfg(feature = "stats")]
    pub(crate) stats: LoaderStats,
}

impl<K, V, E> LoaderState<K, V, E>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            cache: HashMap::new(),
            batch: None,
            next_batch_id: 0,
            #[cfg(feature = "stats")]
            stats: LoaderStats::new(std::any::type_name::<(K, V)>()),
        }
    }

    pub(crate) fn register(&mut self, key: &K, config: &LoaderConfig) -> Registration<K, V, E> {
        #[cfg(feature = "stats")]
        self.stats.record_load_request();

        if let Some(value) = self.cache.lookup(key) {
            tracing::trace!(?key, "cache hit");
            #[cfg(feature = "stats")]
            self.stats.record_cache_hit();
            return Registration::Cached(value.clone());
        }

        let mut opened = None;
        let next_batch_id = &mut self.next_batch_id;
        let batch = self.batch.get_or_insert_with(|| {
            let batch = PendingBatch::new(*next_batch_id);
            *next_batch_id += 1;
            opened = Some(batch.id());
            batch
        });
        let (position, appended) = batch.key_index(key);
        let completion = batch.completion();
        let full = appended && config.is_full(batch.len());

        let filled = if full { self.detach(FlushReason::Size) } else { None };
        Registration::Enqueued { position, completion, opened, filled }
    }

    /// Detaches the open batch if it is still the batch `id`. Returns `None` when that batch was
    /// already closed by reaching its size limit.
    pub(crate) fn detach_expired(&mut self, id: u64) -> Option<PendingBatch<K, V, E>> {
        if self.batch.as_ref().is_some_and(|batch| batch.id() == id) {
            self.detach(FlushReason::Window)
        } else {
            None
        }
    }

    fn detach(&mut self, reason: FlushReason) -> Option<PendingBatch<K, V, E>> {
        let batch = self.batch.take();
        #[cfg(feature = "stats")]
        if let Some(batch) = &batch {
            self.stats.record_dispatch(batch.len(), reason);
        }
        #[cfg(not(feature = "stats"))]
        let _ = reason;
        batch
    }

    pub(crate) fn store(&mut self, key: K, value: V) {
        self.cache.store(key, value);
    }

    pub(crate) fn prime(&mut self, key: K, value: V) -> bool {
        self.cache.store_if_absent(key, value)
    }

    pub(crate) fn clear(&mut self, keys: &[K]) {
        self.cache.evict(keys);
    }

    pub(crate) fn clear_all(&mut self) {
        self.cache.flush();
    }
}

#[cfg(feature = "stats")]
impl<K, V, E> Drop for LoaderState<K, V, E> {
    fn drop(&mut self) {
        tracing::debug!(loader_stats = ?self.stats);
    }
}
