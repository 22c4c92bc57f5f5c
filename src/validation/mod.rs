//! Validation module for checking a graph before any update.
//!
//! Validation never generates pixels: it checks the graph's structure and then
//! runs the information pass.

pub mod pipeline;
pub mod stages;

pub use pipeline::ValidationPipeline;
pub use stages::{MetadataValidation, StructuralValidation, ValidationStage};
