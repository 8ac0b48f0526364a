use std::fmt::Debug;
use std::future::IntoFuture;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::batch::CompletionSignal;
use crate::error::LoadError;
use crate::loader::LoaderInner;

/// A key that has been registered with a [`Loader`](crate::Loader) but not yet awaited.
///
/// Registration happens when the thunk is created, so a caller can register keys on many loaders
/// before waiting on any of them and let all of their batches fill concurrently. Awaiting the thunk
/// waits for the batch holding its key to complete.
#[must_use = "a thunk does nothing unless resolved"]
pub struct Thunk<K, V, E> {
    state: ThunkState<K, V, E>,
}

enum ThunkState<K, V, E> {
    Cached(V),
    Pending {
        key: K,
        position: usize,
        completion: CompletionSignal<V, E>,
        loader: Arc<LoaderInner<K, V, E>>,
    },
}

impl<K, V, E> Thunk<K, V, E>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Default + Send + Sync,
    E: 'static + Clone + Send + Sync,
{
    pub(crate) fn cached(value: V) -> Self {
        Self { state: ThunkState::Cached(value) }
    }

    pub(crate) fn pending(
        key: K,
        position: usize,
        completion: CompletionSignal<V, E>,
        loader: Arc<LoaderInner<K, V, E>>,
    ) -> Self {
        Self { state: ThunkState::Pending { key, position, completion, loader } }
    }

    /// Waits for the key's batch and returns its value.
    ///
    /// Successful values are written to the loader cache. Failures are not cached.
    pub async fn resolve(self) -> Result<V, LoadError<E>> {
        match self.state {
            ThunkState::Cached(value) => Ok(value),
            ThunkState::Pending { key, position, completion, loader } => {
                let result = completion.await.map_err(|_| LoadError::Canceled)?;
                let value = result.outcome(position).map_err(LoadError::Fetch)?;
                loader.state.lock().store(key, value.clone());
                Ok(value)
            }
        }
    }
}

impl<K, V, E> IntoFuture for Thunk<K, V, E>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Default + Send + Sync,
    E: 'static + Clone + Send + Sync,
{
    type Output = Result<V, LoadError<E>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.resolve().boxed()
    }
}

/// Registered thunks for many keys of one loader. Resolves in the order the keys were given.
#[must_use = "a thunk does nothing unless resolved"]
pub struct ThunkAll<K, V, E> {
    thunks: Vec<Thunk<K, V, E>>,
}

impl<K, V, E> ThunkAll<K, V, E>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Default + Send + Sync,
    E: 'static + Clone + Send + Sync,
{
    pub(crate) fn new(thunks: Vec<Thunk<K, V, E>>) -> Self {
        Self { thunks }
    }

    pub async fn resolve(self) -> Vec<Result<V, LoadError<E>>> {
        future::join_all(self.thunks.into_iter().map(Thunk::resolve)).await
    }
}

impl<K, V, E> IntoFuture for ThunkAll<K, V, E>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Clone + Default + Send + Sync,
    E: 'static + Clone + Send + Sync,
{
    type Output = Vec<Result<V, LoadError<E>>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.resolve().boxed()
    }
}
