/// Failure to resolve a single key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError<E> {
    /// The batch function reported an error for this key, either directly or shared by the whole
    /// batch. Failed keys are not cached; loading the key again starts a fresh batch.
    #[error("batch function failed: {0}")]
    Fetch(E),

    /// The task running the batch function died (panicked or its runtime shut down) before
    /// delivering results.
    #[error("batch was dropped before its results were delivered")]
    Canceled,
}

impl<E> LoadError<E> {
    /// Returns the error reported by the batch function, if that is why the load failed.
    pub fn fetch_error(&self) -> Option<&E> {
        match self {
            LoadError::Fetch(error) => Some(error),
            LoadError::Canceled => None,
        }
    }
}
