//! # Rasterflow - Region-streamed Raster Processing
//!
//! Rasterflow runs pipelines of raster filters on demand. Asking a node for
//! a region of its output pulls exactly the data needed from upstream: each
//! filter maps the region it is asked for to the regions it needs from its
//! inputs, and every node is then computed over only that region, split into
//! slabs that run on a thread pool.
//!
//! ## Features
//!
//! - **Demand-driven updates**: information, request and execution passes
//!   over the upstream graph of the requested node
//! - **Region streaming**: large outputs are produced in strips or tiles
//!   with bounded memory, and written to a sink piece by piece
//! - **Multithreaded filters**: every node is split into disjoint slabs;
//!   results are identical for any thread count and any tiling
//! - **Functor adapters**: per-pixel and per-neighborhood operations become
//!   full filters with correct region propagation
//! - **Caching**: results are reused until an upstream parameter changes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rasterflow::prelude::*;
//!
//! let registry = FilterRegistry::<2>::with_builtins();
//! let mut graph = ProcessingGraph::<2>::new();
//!
//! let reader = graph.add_filter(ImageFileReader::open("input.png")?);
//! let mean = graph.add_boxed(registry.create_with("mean", &[("radius", Value::Integer(2))])?);
//! graph.connect(reader, 0, mean, 0)?;
//!
//! let report = ValidationPipeline::default().validate(&graph);
//! assert!(report.can_execute());
//!
//! let engine = ExecutionEngine::new();
//! let manager = StreamingManager::new(StreamingStrategy::NumberOfLinesStripped(64))?;
//! let mut writer = ImageFileWriter::new("output.png");
//! StreamingDriver::new(&engine, manager).stream(&graph, mean, 0, &mut writer, None)?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: regions, descriptors, pixel buffers, the `FilterNode` trait
//! - [`graph`]: graph structure and topology analysis
//! - [`validation`]: structural and metadata checks without pixel work
//! - [`execution`]: the update engine, threaded dispatch, result cache
//! - [`streaming`]: division strategies, the streaming driver and sinks
//! - [`filters`]: functor adapters, the filter registry and built-in filters
//! - [`io`]: image file reader and writer
//! - [`config`]: configuration from TOML and the environment

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod execution;
pub mod filters;
pub mod graph;
pub mod io;
pub mod streaming;
pub mod validation;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::PipelineConfig;

    pub use crate::core::context::{ExecutionContext, InformationContext, RequestContext, ThreadContext};
    pub use crate::core::descriptor::{Geometry, ImageDescriptor};
    pub use crate::core::error::{
        GraphError, NodeId, PipelineError, PipelineResult, ValidationReport, ValidationWarning,
    };
    pub use crate::core::node::{Category, FilterNode, NodeMetadata};
    pub use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
    pub use crate::core::raster::{Raster, RasterSlabMut, SampleType};
    pub use crate::core::region::{Radius, Region};
    pub use crate::core::types::{Value, ValueType};

    pub use crate::graph::connection::{Connection, Endpoint};
    pub use crate::graph::structure::{GraphNode, ProcessingGraph};
    pub use crate::graph::topology::TopologyAnalyzer;

    pub use crate::validation::pipeline::ValidationPipeline;
    pub use crate::validation::stages::{MetadataValidation, StructuralValidation, ValidationStage};

    pub use crate::execution::cache::{CacheStats, ResultCache};
    pub use crate::execution::dispatcher::ThreadedDispatcher;
    pub use crate::execution::engine::{ExecutionEngine, ExecutionOptions, ExecutionStats, UpdateResult};
    pub use crate::execution::progress::{AbortHandle, ProgressCallback, ProgressUpdate, SkipReason};

    pub use crate::streaming::{
        MemorySink, RasterSink, StreamingDriver, StreamingManager, StreamingStats, StreamingStrategy,
    };

    pub use crate::filters::functor::{
        BinaryFunctor, BinaryFunctorFilter, BoundaryPolicy, Neighborhood, NeighborhoodFilter,
        NeighborhoodFunctor, UnaryFunctor, UnaryFunctorFilter,
    };
    pub use crate::filters::registry::{FilterFactory, FilterRegistry};

    pub use crate::filters::builtin::{
        AlphaBlendFilter, AlphaBlendFunctor, BandSplitFilter, ClampFilter, ClampFunctor,
        ConcatenateFilter, ConstantSource, ExtractRegionFilter, GeneratorSource, MeanFilter,
        MeanFunctor, RasterSource, ShiftFilter, ShiftScaleFilter, ShiftScaleFunctor, Statistics,
        StatisticsFilter, StatisticsHandle,
    };

    pub use crate::io::{ImageFileReader, ImageFileWriter};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
