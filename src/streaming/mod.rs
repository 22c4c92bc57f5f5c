//! Streamed execution: producing a large output as a sequence of smaller
//! region updates.

pub mod driver;
pub mod manager;
pub mod sink;

pub use driver::{StreamingDriver, StreamingStats};
pub use manager::{StreamingManager, StreamingStrategy};
pub use sink::{MemorySink, RasterSink};
