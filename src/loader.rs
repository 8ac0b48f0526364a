use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing_futures::Instrument;

use crate::{
    batch::{FetchFn, FlushReason, PendingBatch},
    batch_function::{BatchFunction, BatchResult},
    config::LoaderConfig,
    error::LoadError,
    state::{LoaderState, Registration},
    thunk::{Thunk, ThunkAll},
};
#[cfg(feature = "stats")]
use crate::loader_stats::LoaderStats;

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users can call [`Loader::load`] and [`Loader::load_all`] to fetch values from the underlying
/// resource or cache. Keys requested while a batch window is open are coalesced into one call to
/// the batch function; a key requested twice in the same window is fetched once. The cache can be
/// cleared with calls to [`Loader::clear`] and [`Loader::clear_many`], and values can be added to
/// the cache out-of-band through the use of [`Loader::prime`] and [`Loader::prime_many`].
///
/// Loading is split in two phases. [`Loader::load_thunk`] registers a key synchronously, checking
/// the cache or joining the open batch, and returns a [`Thunk`]. Awaiting the thunk waits for the
/// batch to complete. Registering keys on several loaders before awaiting any of them lets their
/// batches fill and dispatch in parallel.
///
/// A batch is dispatched when its window ([`LoaderConfig::wait`]) elapses or as soon as it holds
/// [`LoaderConfig::max_batch`] keys, whichever comes first. Each dispatch runs the batch function
/// exactly once, on its own task.
///
/// `Loader` is a cheap handle; clones share the same cache and batches.
pub struct Loader<K, V, E> {
    inner: Arc<LoaderInner<K, V, E>>,
}

pub(crate) struct LoaderInner<K, V, E> {
    fetch: FetchFn<K, V, E>,
    config: LoaderConfig,
    pub(crate) state: Mutex<LoaderState<K, V, E>>,
    runtime: Handle,
}

impl<K, V, E> Clone for Loader<K, V, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, V, E> Loader<K, V, E>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Default + Send + Sync,
    E: 'static + Clone + Send + Sync,
{
    /// Creates a new Loader for the provided BatchFunction and Context type, using the default
    /// [`LoaderConfig`].
    ///
    /// Note: the batch function is passed in as a marker for type inference.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new<F, ContextT>(batch_fn: F, context: ContextT) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT, Error = E>,
    {
        Self::with_config(batch_fn, context, LoaderConfig::default())
    }

    /// Creates a new Loader for the provided BatchFunction and Context type.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn with_config<F, ContextT>(_: F, context: ContextT, config: LoaderConfig) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT, Error = E>,
    {
        let context = Arc::new(context);
        let fetch: FetchFn<K, V, E> = Box::new(move |keys: Vec<K>| {
            let context = Arc::clone(&context);
            async move { F::load(&keys, &context).await }.boxed()
        });
        Self::from_parts(fetch, config)
    }

    /// Creates a new Loader from a bulk fetch closure.
    ///
    /// The closure receives the ordered, deduplicated keys of one batch and must return results
    /// positionally matched with them.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn from_fn<Fetch, Fut>(config: LoaderConfig, fetch: Fetch) -> Self
    where
        Fetch: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BatchResult<V, E>> + Send + 'static,
    {
        Self::from_parts(Box::new(move |keys: Vec<K>| fetch(keys).boxed()), config)
    }

    fn from_parts(fetch: FetchFn<K, V, E>, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                fetch,
                config,
                state: Mutex::new(LoaderState::new()),
                runtime: Handle::current(),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Loads a value from the underlying resource.
    ///
    /// If the value is already in the loader cache, it is returned immediately. Otherwise, the
    /// key joins the open batch and this waits for that batch to complete.
    pub async fn load(&self, key: K) -> Result<V, LoadError<E>> {
        self.load_thunk(key).resolve().await
    }

    /// Registers `key` without waiting for it.
    ///
    /// Never blocks on I/O; it only takes the loader lock briefly. Opening a batch starts its window
    /// timer, and filling one dispatches it immediately.
    pub fn load_thunk(&self, key: K) -> Thunk<K, V, E> {
        let registration = self.inner.state.lock().register(&key, &self.inner.config);
        match registration {
            Registration::Cached(value) => Thunk::cached(value),
            Registration::Enqueued { position, completion, opened, filled } => {
                let filled_id = filled.as_ref().map(|batch| batch.id());
                if let Some(batch) = filled {
                    self.spawn_dispatch(batch);
                }
                // A batch that filled on its first key never needs its window.
                if let Some(id) = opened.filter(|id| filled_id != Some(*id)) {
                    tracing::debug!(batch_id = id, wait = ?self.inner.config.wait, "opened batch");
                    self.spawn_window(id);
                }
                Thunk::pending(key, position, completion, Arc::clone(&self.inner))
            }
        }
    }

    /// Loads many values at once.
    ///
    /// Every key is registered before any is awaited, so keys missing from the cache share as few
    /// batches as the configuration allows. Results are returned in the same order as `keys`.
    pub async fn load_all<I>(&self, keys: I) -> Vec<Result<V, LoadError<E>>>
    where
        I: IntoIterator<Item = K>,
    {
        self.load_all_thunk(keys).resolve().await
    }

    /// Registers many keys without waiting for them.
    pub fn load_all_thunk<I>(&self, keys: I) -> ThunkAll<K, V, E>
    where
        I: IntoIterator<Item = K>,
    {
        ThunkAll::new(keys.into_iter().map(|key| self.load_thunk(key)).collect())
    }

    /// Adds a value to the cache unless the key is already cached.
    ///
    /// Returns true if the value was inserted. To overwrite a cached value, [`Loader::clear`] the
    /// key first.
    pub fn prime(&self, key: K, value: V) -> bool {
        self.inner.state.lock().prime(key, value)
    }

    /// Adds many values to the cache at once, skipping keys that are already cached.
    ///
    /// Returns the number of values inserted.
    pub fn prime_many<I>(&self, key_vals: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut state = self.inner.state.lock();
        let mut inserted = 0;
        for (key, value) in key_vals {
            if state.prime(key, value) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub fn clear(&self, key: K) {
        self.inner.state.lock().clear(std::slice::from_ref(&key));
    }

    /// Removes multiple values from the cache at once.
    ///
    /// These keys will be reloaded when requested.
    pub fn clear_many(&self, keys: &[K]) {
        self.inner.state.lock().clear(keys);
    }

    /// Empties the cache. Batches already in flight are unaffected.
    pub fn clear_all(&self) {
        self.inner.state.lock().clear_all();
    }

    /// Returns a snapshot of this loader's batching counters.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> LoaderStats {
        self.inner.state.lock().stats.clone()
    }

    fn spawn_window(&self, batch_id: u64) {
        let inner = Arc::clone(&self.inner);
        let span = tracing::debug_span!("batch_window", batch_id);
        self.inner.runtime.spawn(async move { inner.close_window(batch_id).await }.instrument(span));
    }

    fn spawn_dispatch(&self, batch: PendingBatch<K, V, E>) {
        let inner = Arc::clone(&self.inner);
        let span = tracing::debug_span!("batch_dispatch", batch_id = batch.id());
        self.inner.runtime.spawn(
            async move { batch.dispatch(&inner.fetch, FlushReason::Size).await }.instrument(span),
        );
    }
}

impl<K, V, E> LoaderInner<K, V, E>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
    E: 'static + Send + Sync,
{
    /// Waits out the window of batch `batch_id`, then dispatches it unless the size limit already
    /// did.
    async fn close_window(&self, batch_id: u64) {
        if self.config.wait.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.config.wait).await;
        }

        let expired = self.state.lock().detach_expired(batch_id);
        match expired {
            Some(batch) => batch.dispatch(&self.fetch, FlushReason::Window).await,
            None => tracing::trace!(batch_id, "batch already dispatched by size limit"),
        }
    }
}
