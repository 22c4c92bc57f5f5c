//! Execution of processing graphs.
//!
//! The engine drives updates, the dispatcher runs each node over disjoint
//! slabs on a worker pool, and the cache keeps buffered outputs between
//! updates.

pub mod cache;
pub mod dispatcher;
pub mod engine;
pub mod progress;

pub use cache::{CacheStats, ResultCache};
pub use dispatcher::ThreadedDispatcher;
pub use engine::{ExecutionEngine, ExecutionOptions, ExecutionStats, UpdateResult};
pub use progress::{AbortHandle, ProgressCallback, ProgressTracker, ProgressUpdate, SkipReason};
