use std::fmt::Debug;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::batch_function::BatchResult;

/// Type-erased bulk fetch. Takes the ordered, deduplicated keys of one batch.
pub(crate) type FetchFn<K, V, E> =
    Box<dyn Fn(Vec<K>) -> BoxFuture<'static, BatchResult<V, E>> + Send + Sync>;

/// Resolves exactly once, for every clone, when the batch result is stored. Resolves to an error
/// if the dispatching task died first.
pub(crate) type CompletionSignal<V, E> = Shared<oneshot::Receiver<Arc<BatchResult<V, E>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushReason {
    /// The batch window elapsed.
    Window,
    /// The batch reached `max_batch` keys.
    Size,
}

impl FlushReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Size => "size",
        }
    }
}

/// The keys collected since the last dispatch.
///
/// While the batch is attached to the loader state it is open and only mutated under the loader
/// lock. Detaching it (see `LoaderState::detach`) closes it: from then on the dispatching task owns
/// it exclusively, and results reach waiters through the shared, read-only completion signal.
pub(crate) struct PendingBatch<K, V, E> {
    id: u64,
    keys: Vec<K>,
    completion_tx: oneshot::Sender<Arc<BatchResult<V, E>>>,
    completion: CompletionSignal<V, E>,
}

impl<K, V, E> PendingBatch<K, V, E>
where
    K: Eq + Debug,
{
    pub(crate) fn new(id: u64) -> Self {
        let (completion_tx, completion_rx) = oneshot::channel();
        Self { id, keys: Vec::new(), completion_tx, completion: completion_rx.shared() }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn completion(&self) -> CompletionSignal<V, E> {
        self.completion.clone()
    }

    /// Returns the position of `key` in the batch, appending it if needed. The bool is true when
    /// the key was appended.
    pub(crate) fn key_index(&mut self, key: &K) -> (usize, bool)
    where
        K: Clone,
    {
        match self.keys.iter().position(|existing| existing == key) {
            Some(position) => (position, false),
            None => {
                self.keys.push(key.clone());
                (self.keys.len() - 1, true)
            }
        }
    }

    /// Runs the batch function once and releases every waiter.
    pub(crate) async fn dispatch(self, fetch: &FetchFn<K, V, E>, reason: FlushReason) {
        let Self { id, keys, completion_tx, .. } = self;
        let key_count = keys.len();
        tracing::debug!(batch_id = id, key_count, reason = reason.as_str(), ?keys, "dispatching batch");

        let result = fetch(keys).await;
        result.check_shape(key_count);

        if completion_tx.send(Arc::new(result)).is_err() {
            tracing::trace!(batch_id = id, "every waiter dropped before the batch completed");
        }
        tracing::debug!(batch_id = id, "batch completed");
    }
}
