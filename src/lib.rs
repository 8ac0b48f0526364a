mod batch;
mod batch_function;
mod cache;
mod config;
mod error;
mod loader;
#[cfg(feature = "stats")]
mod loader_stats;
mod state;
mod thunk;

pub use batch_function::{BatchErrors, BatchFunction, BatchResult};
pub use config::{LoaderConfig, DEFAULT_WAIT};
pub use error::LoadError;
pub use loader::Loader;
#[cfg(feature = "stats")]
pub use loader_stats::LoaderStats;
pub use thunk::{Thunk, ThunkAll};
