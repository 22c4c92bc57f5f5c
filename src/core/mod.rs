//! Core types and traits for the rasterflow pipeline.
//!
//! This module contains the foundational types every other part builds on:
//! - Regions and halo radii
//! - Image descriptors and pixel buffers
//! - Parameter values and definitions
//! - The FilterNode trait and node metadata
//! - Error types and modification stamps
//! - Per-phase contexts handed to filters

pub mod types;
pub mod port;
pub mod error;
pub mod region;
pub mod descriptor;
pub mod raster;
pub mod context;
pub mod node;
pub mod timestamp;

// Re-export commonly used types
pub use types::{Value, ValueType};
pub use port::{Constraint, ParameterDefinition, PortDefinition};
pub use error::{GraphError, NodeId, PipelineError, PipelineResult};
pub use region::{Radius, Region};
pub use descriptor::{Geometry, ImageDescriptor};
pub use raster::{Raster, RasterSlabMut, SampleType};
pub use context::{ExecutionContext, InformationContext, RequestContext, ThreadContext};
pub use node::{Category, FilterNode, NodeMetadata};
pub use timestamp::Stamp;
