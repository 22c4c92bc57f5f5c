//! Neighborhood mean.

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, NodeMetadata};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::raster::SampleType;
use crate::core::region::Radius;
use crate::core::types::{Value, ValueType};
use crate::filters::functor::{Neighborhood, NeighborhoodFilter, NeighborhoodFunctor};
use crate::filters::registry::FilterRegistry;

/// Register the mean filter.
pub fn register<const D: usize>(registry: &mut FilterRegistry<D>) {
    registry.register(|| Box::new(MeanFilter::new(MeanFunctor::new(1))));
}

/// Mean over a box of the given radius, computed in `f64`.
///
/// Only neighbors the boundary policy yields are averaged, so with the
/// default clipping a corner pixel averages the pixels that exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanFunctor {
    radius: u64,
}

pub type MeanFilter = NeighborhoodFilter<MeanFunctor>;

impl MeanFunctor {
    pub fn new(radius: u64) -> Self {
        Self { radius }
    }
}

impl<const D: usize> NeighborhoodFunctor<D> for MeanFunctor {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("mean", "Neighborhood Mean")
            .category(Category::Neighborhood)
            .description("Mean of the box of the given radius around every pixel")
            .input(PortDefinition::new("image"))
            .parameter(
                ParameterDefinition::new("radius", ValueType::Integer, Value::Integer(1))
                    .with_description("Half-width of the box along every axis")
                    .with_constraint(Constraint::NonNegative),
            )
            .build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        NeighborhoodFunctor::<D>::metadata(self).validate_parameter(name, value)?;
        self.radius = value
            .as_integer()
            .map(|r| r as u64)
            .ok_or_else(|| PipelineError::configuration(name, "expected an integer"))?;
        Ok(())
    }

    fn radius(&self) -> Radius<D> {
        Radius::uniform(self.radius)
    }

    fn output_sample_type(&self, _input: SampleType) -> SampleType {
        SampleType::F64
    }

    fn apply(&self, neighborhood: &Neighborhood<'_, D>, out: &mut [f64]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        let mut count = 0usize;
        for pixel in neighborhood.values() {
            for (sum, v) in out.iter_mut().zip(pixel) {
                *sum += v;
            }
            count += 1;
        }
        if count > 0 {
            out.iter_mut().for_each(|v| *v /= count as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FilterNode;
    use crate::core::raster::Raster;
    use crate::core::region::Region;
    use crate::execution::engine::{ExecutionEngine, ExecutionOptions};
    use crate::filters::builtin::RasterSource;
    use crate::filters::functor::BoundaryPolicy;
    use crate::graph::structure::ProcessingGraph;

    fn ramp() -> Raster<2> {
        let region = Region::from_size([10, 10]);
        let data = region.iter().map(|i| (i[0] + 10 * i[1]) as f64).collect();
        Raster::from_data(region, 1, SampleType::U8, data).unwrap()
    }

    #[test]
    fn test_interior_and_corner() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(RasterSource::new(ramp()));
        let mean = graph.add_filter(MeanFilter::new(MeanFunctor::new(1)));
        graph.connect(source, 0, mean, 0).unwrap();

        let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_threads(3));
        let out = engine.update(&graph, mean).unwrap();
        assert_eq!(out.sample_type(), SampleType::F64);
        // Linear ramp: the 3x3 mean of an interior pixel is the pixel itself.
        assert_eq!(out.get_component(&[5, 5], 0), Some(55.0));
        // Corner: mean of 0, 1, 10, 11.
        assert_eq!(out.get_component(&[0, 0], 0), Some(5.5));
    }

    #[test]
    fn test_mirror_boundary() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(RasterSource::new(ramp()));
        let mean = graph.add_filter(
            MeanFilter::new(MeanFunctor::new(1)).with_boundary(BoundaryPolicy::Mirror),
        );
        graph.connect(source, 0, mean, 0).unwrap();

        let out = ExecutionEngine::new().update(&graph, mean).unwrap();
        // Row and column -1 mirror onto 1.
        let expected = (11.0 + 10.0 + 11.0 + 1.0 + 0.0 + 1.0 + 11.0 + 10.0 + 11.0) / 9.0;
        assert_eq!(out.get_component(&[0, 0], 0), Some(expected));
    }

    #[test]
    fn test_radius_parameter() {
        let mut filter = MeanFilter::new(MeanFunctor::new(1));
        FilterNode::<2>::set_parameter(&mut filter, "radius", &Value::Integer(3)).unwrap();
        assert_eq!(NeighborhoodFunctor::<2>::radius(filter.functor()), Radius::uniform(3));
        assert!(FilterNode::<2>::set_parameter(&mut filter, "radius", &Value::Integer(-1)).is_err());
    }
}
