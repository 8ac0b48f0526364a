use async_trait::async_trait;

/// A `BatchFunction` defines the method through which some `Loader` may fetch batched data from
/// some resource. The `BatchFunction` receives the ordered, deduplicated keys collected during one
/// batch window, and some user defined context struct.
///
/// The returned [`BatchResult`] is positional: `values[i]` belongs to `keys[i]`. Errors can be
/// reported once for the whole batch or per key, see [`BatchErrors`].
///
/// Multiple `BatchFunctions` (and therefore loaders) can share the same context (likely through an
/// `Arc`).
#[async_trait]
pub trait BatchFunction<K, V> {
    type Context;
    type Error;
    async fn load(keys: &[K], context: &Self::Context) -> BatchResult<V, Self::Error>;
}

/// Errors reported by a batch fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchErrors<E> {
    /// Every key succeeded.
    None,
    /// One failure that applies to every key of the batch.
    Shared(E),
    /// Positional errors, parallel to the batch keys.
    ///
    /// A list holding exactly one entry is broadcast to every key, like [`BatchErrors::Shared`].
    /// Entries missing past the end of the list mean "no error".
    PerKey(Vec<Option<E>>),
}

impl<E> BatchErrors<E> {
    /// Returns the error that applies to the key at `position`, if any.
    pub fn error_for(&self, position: usize) -> Option<&E> {
        match self {
            BatchErrors::None => None,
            BatchErrors::Shared(error) => Some(error),
            BatchErrors::PerKey(errors) if errors.len() == 1 => errors[0].as_ref(),
            BatchErrors::PerKey(errors) => errors.get(position).and_then(Option::as_ref),
        }
    }
}

/// The output of one [`BatchFunction::load`] call.
///
/// `values` must be order-matched with the requested keys. Returning fewer values than keys is a
/// bug in the batch function: keys past the end resolve to `V::default()` without an error, and a
/// warning is logged when the batch completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult<V, E> {
    pub values: Vec<V>,
    pub errors: BatchErrors<E>,
}

impl<V, E> BatchResult<V, E> {
    /// All keys loaded successfully.
    pub fn ok(values: Vec<V>) -> Self {
        Self { values, errors: BatchErrors::None }
    }

    /// The whole batch failed with a single error.
    pub fn shared_error(error: E) -> Self {
        Self { values: Vec::new(), errors: BatchErrors::Shared(error) }
    }

    /// Values and errors reported per key. Values at failed positions are ignored.
    pub fn per_key(values: Vec<V>, errors: Vec<Option<E>>) -> Self {
        Self { values, errors: BatchErrors::PerKey(errors) }
    }

    /// Resolves the key at `position` to its value or error.
    pub(crate) fn outcome(&self, position: usize) -> Result<V, E>
    where
        V: Clone + Default,
        E: Clone,
    {
        if let Some(error) = self.errors.error_for(position) {
            return Err(error.clone());
        }
        Ok(self.values.get(position).cloned().unwrap_or_default())
    }

    /// Logs a warning when the result shape does not match the number of requested keys.
    pub(crate) fn check_shape(&self, key_count: usize) {
        if self.values.len() < key_count && !matches!(self.errors, BatchErrors::Shared(_)) {
            tracing::warn!(
                key_count,
                value_count = self.values.len(),
                "batch function returned fewer values than keys; missing values default"
            );
        }
        if let BatchErrors::PerKey(errors) = &self.errors {
            if errors.len() != 1 && errors.len() != key_count {
                tracing::warn!(
                    key_count,
                    error_count = errors.len(),
                    "batch function returned a per-key error list of unexpected length"
                );
            }
        }
    }
}

impl<V: Default, E> FromIterator<Result<V, E>> for BatchResult<V, E> {
    fn from_iter<I: IntoIterator<Item = Result<V, E>>>(iter: I) -> Self {
        let mut values = Vec::new();
        let mut errors = Vec::new();
        let mut failed = false;
        for result in iter {
            match result {
                Ok(value) => {
                    values.push(value);
                    errors.push(None);
                }
                Err(error) => {
                    values.push(V::default());
                    errors.push(Some(error));
                    failed = true;
                }
            }
        }
        if failed {
            Self::per_key(values, errors)
        } else {
            Self::ok(values)
        }
    }
}
