//! Built-in filter implementations.
//!
//! This module contains the standard filters that ship with rasterflow.

mod bands;
mod blend;
mod geometry;
mod intensity;
mod mean;
mod sources;
mod statistics;

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::types::Value;
use crate::filters::registry::FilterRegistry;

/// Register all built-in filters.
pub fn register_all<const D: usize>(registry: &mut FilterRegistry<D>) {
    sources::register(registry);
    intensity::register(registry);
    mean::register(registry);
    blend::register(registry);
    geometry::register(registry);
    bands::register(registry);
    statistics::register(registry);
}

/// One integer per axis.
pub(crate) fn index_parameter<const D: usize>(name: &str, value: &Value) -> PipelineResult<[i64; D]> {
    let items = value
        .as_array()
        .ok_or_else(|| PipelineError::configuration(name, "expected a list of integers"))?;
    if items.len() != D {
        return Err(PipelineError::configuration(
            name,
            format!("expected {} values, got {}", D, items.len()),
        ));
    }
    let mut out = [0i64; D];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .as_integer()
            .ok_or_else(|| PipelineError::configuration(name, "expected integers"))?;
    }
    Ok(out)
}

/// One non-negative integer per axis.
pub(crate) fn size_parameter<const D: usize>(name: &str, value: &Value) -> PipelineResult<[u64; D]> {
    let index: [i64; D] = index_parameter(name, value)?;
    let mut out = [0u64; D];
    for (slot, v) in out.iter_mut().zip(index) {
        *slot = u64::try_from(v)
            .map_err(|_| PipelineError::configuration(name, "sizes must be non-negative"))?;
    }
    Ok(out)
}

// Re-export for direct access
pub use bands::{BandSplitFilter, ConcatenateFilter};
pub use blend::{AlphaBlendFilter, AlphaBlendFunctor};
pub use geometry::{ExtractRegionFilter, ShiftFilter};
pub use intensity::{ClampFilter, ClampFunctor, ShiftScaleFilter, ShiftScaleFunctor};
pub use mean::{MeanFilter, MeanFunctor};
pub use sources::{ConstantSource, GeneratorSource, RasterSource};
pub use statistics::{Statistics, StatisticsFilter, StatisticsHandle};
